use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::path::Path;

use crate::models::{
    Attachment, CategoryTotal, ChatMessage, Employee, ExpenseCategory, Invoice, InvoiceSummary,
    ParsedInvoice, ParserCorrection, Project, ProjectStatus, Shift, Supplier, Task, TaskStatus,
};
use crate::utils::now_rfc3339;

/// Filters shared by the task listing call sites (bot commands, data agent,
/// CLI). Absent fields mean "no constraint".
#[derive(Debug, Default, Clone)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<String>,
    pub project_id: Option<String>,
    pub limit: Option<usize>,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> SqlResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> SqlResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut db = Database { conn };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&mut self) -> SqlResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        let migrations = vec![
            (
                "001_create_core_tables.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/001_create_core_tables.sql"
                )),
            ),
            (
                "002_create_telegram_and_logs.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/002_create_telegram_and_logs.sql"
                )),
            ),
            (
                "003_create_parser_corrections.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/003_create_parser_corrections.sql"
                )),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM schema_migrations WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;

            if applied.is_none() {
                let tx = self.conn.transaction()?;
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, datetime('now'))",
                    params![name],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }

    // ---- projects ----

    pub fn upsert_project(&self, project: &Project) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO projects (
                id, number, title, client_name, address, status, budget,
                due_date, description, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                project.id,
                project.number,
                project.title,
                project.client_name,
                project.address,
                project.status.as_str(),
                project.budget,
                project.due_date,
                project.description,
                project.created_at,
                project.updated_at
            ],
        )?;
        Ok(())
    }

    pub fn get_project(&self, id: &str) -> SqlResult<Option<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM projects WHERE id = ?1",
            PROJECT_COLUMNS
        ))?;
        stmt.query_row(params![id], row_to_project).optional()
    }

    pub fn find_project_by_title(&self, needle: &str) -> SqlResult<Option<Project>> {
        let pattern = format!("%{}%", needle);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM projects WHERE title LIKE ?1 OR client_name LIKE ?1
             ORDER BY created_at DESC LIMIT 1",
            PROJECT_COLUMNS
        ))?;
        stmt.query_row(params![pattern], row_to_project).optional()
    }

    pub fn list_projects(
        &self,
        status: Option<ProjectStatus>,
        limit: usize,
    ) -> SqlResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM projects
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC LIMIT ?2",
            PROJECT_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![status.map(|s| s.as_str()), limit as i64],
            row_to_project,
        )?;
        rows.collect()
    }

    pub fn delete_project(&self, id: &str) -> SqlResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ---- tasks ----

    pub fn upsert_task(&self, task: &Task) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tasks (
                id, title, description, status, priority, project_id,
                assignee_id, due_date, created_at, updated_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                task.id,
                task.title,
                task.description,
                task.status.as_str(),
                task.priority,
                task.project_id,
                task.assignee_id,
                task.due_date,
                task.created_at,
                task.updated_at,
                task.completed_at
            ],
        )?;
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> SqlResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS))?;
        stmt.query_row(params![id], row_to_task).optional()
    }

    pub fn list_tasks(&self, filter: &TaskFilter) -> SqlResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR assignee_id = ?2)
               AND (?3 IS NULL OR project_id = ?3)
             ORDER BY created_at DESC LIMIT ?4",
            TASK_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![
                filter.status.map(|s| s.as_str()),
                filter.assignee_id,
                filter.project_id,
                filter.limit.unwrap_or(50) as i64
            ],
            row_to_task,
        )?;
        rows.collect()
    }

    pub fn latest_task(&self, assignee_id: Option<&str>) -> SqlResult<Option<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks
             WHERE (?1 IS NULL OR assignee_id = ?1)
             ORDER BY created_at DESC LIMIT 1",
            TASK_COLUMNS
        ))?;
        stmt.query_row(params![assignee_id], row_to_task).optional()
    }

    pub fn find_task_by_title(&self, needle: &str) -> SqlResult<Option<Task>> {
        let pattern = format!("%{}%", needle);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE title LIKE ?1 ORDER BY created_at DESC LIMIT 1",
            TASK_COLUMNS
        ))?;
        stmt.query_row(params![pattern], row_to_task).optional()
    }

    pub fn delete_task(&self, id: &str) -> SqlResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ---- suppliers ----

    pub fn insert_supplier(&self, supplier: &Supplier) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO suppliers (id, name, inn, category, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                supplier.id,
                supplier.name,
                supplier.inn,
                supplier.category.as_str(),
                supplier.created_at
            ],
        )?;
        Ok(())
    }

    pub fn get_supplier(&self, id: &str) -> SqlResult<Option<Supplier>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, inn, category, created_at FROM suppliers WHERE id = ?1",
        )?;
        stmt.query_row(params![id], row_to_supplier).optional()
    }

    pub fn find_supplier_by_inn(&self, inn: &str) -> SqlResult<Option<Supplier>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, inn, category, created_at FROM suppliers WHERE inn = ?1",
        )?;
        stmt.query_row(params![inn], row_to_supplier).optional()
    }

    pub fn find_supplier_by_name(&self, name: &str) -> SqlResult<Option<Supplier>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, inn, category, created_at FROM suppliers WHERE name = ?1",
        )?;
        stmt.query_row(params![name], row_to_supplier).optional()
    }

    pub fn update_supplier_category(
        &self,
        supplier_id: &str,
        category: ExpenseCategory,
    ) -> SqlResult<bool> {
        let changed = self.conn.execute(
            "UPDATE suppliers SET category = ?2 WHERE id = ?1",
            params![supplier_id, category.as_str()],
        )?;
        Ok(changed > 0)
    }

    pub fn list_suppliers(&self) -> SqlResult<Vec<Supplier>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, inn, category, created_at FROM suppliers ORDER BY name")?;
        let rows = stmt.query_map([], row_to_supplier)?;
        rows.collect()
    }

    // ---- employees ----

    pub fn insert_employee(&self, employee: &Employee) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO employees (
                id, full_name, role, phone, telegram_id, telegram_username, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                employee.id,
                employee.full_name,
                employee.role,
                employee.phone,
                employee.telegram_id,
                employee.telegram_username,
                employee.created_at
            ],
        )?;
        Ok(())
    }

    pub fn get_employee(&self, id: &str) -> SqlResult<Option<Employee>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM employees WHERE id = ?1",
            EMPLOYEE_COLUMNS
        ))?;
        stmt.query_row(params![id], row_to_employee).optional()
    }

    pub fn find_employee_by_telegram_id(&self, telegram_id: i64) -> SqlResult<Option<Employee>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM employees WHERE telegram_id = ?1",
            EMPLOYEE_COLUMNS
        ))?;
        stmt.query_row(params![telegram_id], row_to_employee)
            .optional()
    }

    pub fn list_employees(&self) -> SqlResult<Vec<Employee>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM employees ORDER BY full_name",
            EMPLOYEE_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_employee)?;
        rows.collect()
    }

    pub fn link_telegram(
        &self,
        employee_id: &str,
        telegram_id: i64,
        username: Option<&str>,
    ) -> SqlResult<bool> {
        let changed = self.conn.execute(
            "UPDATE employees SET telegram_id = ?2, telegram_username = ?3 WHERE id = ?1",
            params![employee_id, telegram_id, username],
        )?;
        Ok(changed > 0)
    }

    // ---- invoices ----

    pub fn upsert_invoice(&self, invoice: &Invoice) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO invoices (
                id, invoice_number, invoice_date, due_date, total_amount, vat_amount,
                vat_rate, supplier_id, project_id, file_path, file_hash, ocr_text,
                status, paid_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                invoice.id,
                invoice.invoice_number,
                invoice.invoice_date,
                invoice.due_date,
                invoice.total_amount,
                invoice.vat_amount,
                invoice.vat_rate,
                invoice.supplier_id,
                invoice.project_id,
                invoice.file_path,
                invoice.file_hash,
                invoice.ocr_text,
                invoice.status,
                invoice.paid_at,
                invoice.created_at,
                invoice.updated_at
            ],
        )?;
        Ok(())
    }

    pub fn get_invoice(&self, id: &str) -> SqlResult<Option<Invoice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM invoices WHERE id = ?1",
            INVOICE_COLUMNS
        ))?;
        stmt.query_row(params![id], row_to_invoice).optional()
    }

    pub fn get_invoice_by_path(&self, path: &str) -> SqlResult<Option<Invoice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM invoices WHERE file_path = ?1",
            INVOICE_COLUMNS
        ))?;
        stmt.query_row(params![path], row_to_invoice).optional()
    }

    pub fn list_invoices_for_project(&self, project_id: &str) -> SqlResult<Vec<Invoice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM invoices WHERE project_id = ?1 ORDER BY invoice_date DESC",
            INVOICE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![project_id], row_to_invoice)?;
        rows.collect()
    }

    pub fn list_invoice_summaries(&self, limit: usize) -> SqlResult<Vec<InvoiceSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.invoice_number, i.invoice_date, s.name, i.total_amount, i.status
             FROM invoices i LEFT JOIN suppliers s ON s.id = i.supplier_id
             ORDER BY i.invoice_date DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(InvoiceSummary {
                id: row.get(0)?,
                invoice_number: row.get(1)?,
                invoice_date: row.get(2)?,
                supplier_name: row.get(3)?,
                total_amount: row.get(4)?,
                status: row.get(5)?,
            })
        })?;
        rows.collect()
    }

    pub fn mark_invoice_paid(&self, id: &str) -> SqlResult<bool> {
        let changed = self.conn.execute(
            "UPDATE invoices SET status = 'paid', paid_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, now_rfc3339()],
        )?;
        Ok(changed > 0)
    }

    pub fn monthly_total(&self, year_month: &str) -> SqlResult<f64> {
        let total: Option<f64> = self.conn.query_row(
            "SELECT SUM(total_amount) FROM invoices WHERE substr(invoice_date, 1, 7) = ?1",
            params![year_month],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }

    pub fn yearly_total(&self, year: &str) -> SqlResult<f64> {
        let total: Option<f64> = self.conn.query_row(
            "SELECT SUM(total_amount) FROM invoices WHERE substr(invoice_date, 1, 4) = ?1",
            params![year],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }

    pub fn unpaid_total(&self) -> SqlResult<f64> {
        let total: Option<f64> = self.conn.query_row(
            "SELECT SUM(total_amount) FROM invoices WHERE status != 'paid'",
            [],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0.0))
    }

    /// Spend per expense category for one year. Category comes from the
    /// linked supplier; invoices without one land in "other".
    pub fn totals_by_category(&self, year: &str) -> SqlResult<Vec<CategoryTotal>> {
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(s.category, 'other') AS category, SUM(i.total_amount)
             FROM invoices i LEFT JOIN suppliers s ON s.id = i.supplier_id
             WHERE substr(i.invoice_date, 1, 4) = ?1
             GROUP BY category ORDER BY 2 DESC",
        )?;
        let rows = stmt.query_map(params![year], |row| {
            Ok(CategoryTotal {
                category: row.get(0)?,
                total: row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
            })
        })?;
        rows.collect()
    }

    // ---- shifts, messages, attachments ----

    pub fn insert_shift(&self, shift: &Shift) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO shifts (id, employee_id, project_id, shift_date, hours, note)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                shift.id,
                shift.employee_id,
                shift.project_id,
                shift.shift_date,
                shift.hours,
                shift.note
            ],
        )?;
        Ok(())
    }

    pub fn list_shifts_for_employee(&self, employee_id: &str) -> SqlResult<Vec<Shift>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, employee_id, project_id, shift_date, hours, note
             FROM shifts WHERE employee_id = ?1 ORDER BY shift_date DESC",
        )?;
        let rows = stmt.query_map(params![employee_id], |row| {
            Ok(Shift {
                id: row.get(0)?,
                employee_id: row.get(1)?,
                project_id: row.get(2)?,
                shift_date: row.get(3)?,
                hours: row.get(4)?,
                note: row.get(5)?,
            })
        })?;
        rows.collect()
    }

    pub fn insert_message(&self, message: &ChatMessage) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO messages (id, employee_id, body, sent_at) VALUES (?1, ?2, ?3, ?4)",
            params![message.id, message.employee_id, message.body, message.sent_at],
        )?;
        Ok(())
    }

    pub fn recent_messages(&self, limit: usize) -> SqlResult<Vec<ChatMessage>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, employee_id, body, sent_at FROM messages
             ORDER BY sent_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ChatMessage {
                id: row.get(0)?,
                employee_id: row.get(1)?,
                body: row.get(2)?,
                sent_at: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    pub fn insert_attachment(&self, attachment: &Attachment) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO attachments (
                id, invoice_id, project_id, file_name, file_path, mime_type, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                attachment.id,
                attachment.invoice_id,
                attachment.project_id,
                attachment.file_name,
                attachment.file_path,
                attachment.mime_type,
                attachment.created_at
            ],
        )?;
        Ok(())
    }

    pub fn list_attachments_for_invoice(&self, invoice_id: &str) -> SqlResult<Vec<Attachment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, invoice_id, project_id, file_name, file_path, mime_type, created_at
             FROM attachments WHERE invoice_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![invoice_id], |row| {
            Ok(Attachment {
                id: row.get(0)?,
                invoice_id: row.get(1)?,
                project_id: row.get(2)?,
                file_name: row.get(3)?,
                file_path: row.get(4)?,
                mime_type: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        rows.collect()
    }

    // ---- telegram link codes ----

    /// One active code per telegram account: old codes are dropped first.
    pub fn store_link_code(
        &self,
        telegram_id: i64,
        username: Option<&str>,
        code: &str,
        expires_at: &str,
    ) -> SqlResult<()> {
        self.conn.execute(
            "DELETE FROM telegram_link_codes WHERE telegram_id = ?1",
            params![telegram_id],
        )?;
        self.conn.execute(
            "INSERT INTO telegram_link_codes (telegram_id, telegram_username, link_code, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![telegram_id, username, code, expires_at],
        )?;
        Ok(())
    }

    /// Looks a code up and deletes it. Expiry is checked by the caller so
    /// the user gets a distinct message for stale codes.
    pub fn take_link_code(&self, code: &str) -> SqlResult<Option<(i64, Option<String>, String)>> {
        let found = self
            .conn
            .query_row(
                "SELECT telegram_id, telegram_username, expires_at
                 FROM telegram_link_codes WHERE link_code = ?1",
                params![code],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        if found.is_some() {
            self.conn.execute(
                "DELETE FROM telegram_link_codes WHERE link_code = ?1",
                params![code],
            )?;
        }
        Ok(found)
    }

    // ---- parser corrections and processing log ----

    pub fn insert_correction(&self, correction: &ParserCorrection) -> SqlResult<()> {
        let corrected_json = serde_json::to_string(&correction.corrected)
            .unwrap_or_else(|_| "{}".to_string());
        self.conn.execute(
            "INSERT INTO parser_corrections (id, invoice_id, ocr_text, corrected_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                correction.id,
                correction.invoice_id,
                correction.ocr_text,
                corrected_json,
                correction.created_at
            ],
        )?;
        Ok(())
    }

    pub fn list_corrections(&self) -> SqlResult<Vec<ParserCorrection>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, invoice_id, ocr_text, corrected_json, created_at
             FROM parser_corrections ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |row| {
            let corrected_json: String = row.get(3)?;
            Ok(ParserCorrection {
                id: row.get(0)?,
                invoice_id: row.get(1)?,
                ocr_text: row.get(2)?,
                corrected: serde_json::from_str::<ParsedInvoice>(&corrected_json)
                    .unwrap_or_default(),
                created_at: row.get(4)?,
            })
        })?;
        rows.collect()
    }

    pub fn log_processing(
        &self,
        invoice_id: Option<&str>,
        file_hash: Option<&str>,
        process_type: &str,
        status: &str,
        message: Option<&str>,
    ) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO processing_logs (id, invoice_id, file_hash, process_type, status, message, created_at)
             VALUES (hex(randomblob(16)), ?1, ?2, ?3, ?4, ?5, datetime('now'))",
            params![invoice_id, file_hash, process_type, status, message],
        )?;
        Ok(())
    }
}

const PROJECT_COLUMNS: &str = "id, number, title, client_name, address, status, budget, \
     due_date, description, created_at, updated_at";

const TASK_COLUMNS: &str = "id, title, description, status, priority, project_id, \
     assignee_id, due_date, created_at, updated_at, completed_at";

const EMPLOYEE_COLUMNS: &str =
    "id, full_name, role, phone, telegram_id, telegram_username, created_at";

const INVOICE_COLUMNS: &str = "id, invoice_number, invoice_date, due_date, total_amount, \
     vat_amount, vat_rate, supplier_id, project_id, file_path, file_hash, ocr_text, \
     status, paid_at, created_at, updated_at";

fn row_to_project(row: &rusqlite::Row<'_>) -> SqlResult<Project> {
    let status: String = row.get(5)?;
    Ok(Project {
        id: row.get(0)?,
        number: row.get(1)?,
        title: row.get(2)?,
        client_name: row.get(3)?,
        address: row.get(4)?,
        status: ProjectStatus::parse(&status).unwrap_or(ProjectStatus::Planning),
        budget: row.get(6)?,
        due_date: row.get(7)?,
        description: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> SqlResult<Task> {
    let status: String = row.get(3)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Todo),
        priority: row.get(4)?,
        project_id: row.get(5)?,
        assignee_id: row.get(6)?,
        due_date: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        completed_at: row.get(10)?,
    })
}

fn row_to_supplier(row: &rusqlite::Row<'_>) -> SqlResult<Supplier> {
    let category: String = row.get(3)?;
    Ok(Supplier {
        id: row.get(0)?,
        name: row.get(1)?,
        inn: row.get(2)?,
        category: ExpenseCategory::parse(&category).unwrap_or(ExpenseCategory::Other),
        created_at: row.get(4)?,
    })
}

fn row_to_employee(row: &rusqlite::Row<'_>) -> SqlResult<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        full_name: row.get(1)?,
        role: row.get(2)?,
        phone: row.get(3)?,
        telegram_id: row.get(4)?,
        telegram_username: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn row_to_invoice(row: &rusqlite::Row<'_>) -> SqlResult<Invoice> {
    Ok(Invoice {
        id: row.get(0)?,
        invoice_number: row.get(1)?,
        invoice_date: row.get(2)?,
        due_date: row.get(3)?,
        total_amount: row.get(4)?,
        vat_amount: row.get(5)?,
        vat_rate: row.get(6)?,
        supplier_id: row.get(7)?,
        project_id: row.get(8)?,
        file_path: row.get(9)?,
        file_hash: row.get(10)?,
        ocr_text: row.get(11)?,
        status: row.get(12)?,
        paid_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}
