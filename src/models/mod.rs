use serde::{Deserialize, Serialize};

/// Project lifecycle. Stored as text in sqlite, parsed back on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Planning,
    Active,
    OnHold,
    Done,
    Cancelled,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Planning => "planning",
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Done => "done",
            ProjectStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "planning" => Some(ProjectStatus::Planning),
            "active" => Some(ProjectStatus::Active),
            "on_hold" => Some(ProjectStatus::OnHold),
            "done" => Some(ProjectStatus::Done),
            "cancelled" => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }
}

/// Canonical task status set. Older pages wrote `pending` and `completed`;
/// those map onto `todo` and `done` when rows are read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Review,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" | "pending" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "blocked" => Some(TaskStatus::Blocked),
            "review" => Some(TaskStatus::Review),
            "done" | "completed" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

/// Expense category of a supplier. Invoices inherit it through supplier_id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseCategory {
    Materials,
    Tools,
    Transport,
    Services,
    Other,
}

impl ExpenseCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseCategory::Materials => "materials",
            ExpenseCategory::Tools => "tools",
            ExpenseCategory::Transport => "transport",
            ExpenseCategory::Services => "services",
            ExpenseCategory::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "materials" => Some(ExpenseCategory::Materials),
            "tools" => Some(ExpenseCategory::Tools),
            "transport" => Some(ExpenseCategory::Transport),
            "services" => Some(ExpenseCategory::Services),
            "other" => Some(ExpenseCategory::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub number: String,
    pub title: String,
    pub client_name: Option<String>,
    pub address: Option<String>,
    pub status: ProjectStatus,
    pub budget: Option<f64>,
    pub due_date: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    /// 1 = high, 2 = medium, 3 = low.
    pub priority: i64,
    pub project_id: Option<String>,
    pub assignee_id: Option<String>,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub total_amount: f64,
    pub vat_amount: Option<f64>,
    pub vat_rate: Option<f64>,
    pub supplier_id: Option<String>,
    pub project_id: Option<String>,
    pub file_path: Option<String>,
    pub file_hash: Option<String>,
    pub ocr_text: Option<String>,
    /// "new" until marked paid; "paid" sets paid_at.
    pub status: String,
    pub paid_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub id: String,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub supplier_name: Option<String>,
    pub total_amount: f64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub inn: Option<String>,
    pub category: ExpenseCategory,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: String,
    pub full_name: String,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub telegram_id: Option<i64>,
    pub telegram_username: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shift {
    pub id: String,
    pub employee_id: String,
    pub project_id: Option<String>,
    pub shift_date: String,
    pub hours: f64,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub employee_id: Option<String>,
    pub body: String,
    pub sent_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub invoice_id: Option<String>,
    pub project_id: Option<String>,
    pub file_name: String,
    pub file_path: String,
    pub mime_type: Option<String>,
    pub created_at: String,
}

/// Best-guess structured record pulled out of OCR text. Every field is
/// optional: a non-match yields None, never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedInvoice {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub total_amount: Option<f64>,
    pub vat_amount: Option<f64>,
    pub vat_rate: Option<f64>,
    pub supplier_name: Option<String>,
    pub supplier_inn: Option<String>,
}

/// Human-corrected reference for a recognized invoice, kept for the parser
/// quality report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserCorrection {
    pub id: String,
    pub invoice_id: String,
    pub ocr_text: String,
    pub corrected: ParsedInvoice,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub month_total: f64,
    pub year_total: f64,
    pub unpaid_total: f64,
    pub by_category: Vec<CategoryTotal>,
    pub recent_invoices: Vec<InvoiceSummary>,
}
