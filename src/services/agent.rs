//! Free-text assistant behind the bot. A chat model turns the message
//! into a small intent JSON; the intent runs against the local db; the
//! answer is optionally rephrased by the same model.
//!
//! Every model failure degrades: bad intent JSON becomes `unknown`,
//! a failed rephrase falls back to the raw data answer.

use anyhow::{anyhow, Result};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::{Database, TaskFilter};
use crate::models::{Employee, InvoiceSummary, Project, ProjectStatus, Task, TaskStatus};
use crate::state::AppState;
use crate::utils::{format_decimal, now_rfc3339};
use std::sync::{Arc, Mutex};

const DEEPSEEK_URL: &str = "https://api.deepseek.com/chat/completions";
const MODEL: &str = "deepseek-chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    GetTasks,
    GetProjects,
    GetInvoices,
    CreateTask,
    UpdateTask,
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct Intent {
    pub action: Action,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    /// Project title fragment for task creation.
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub target: Option<Target>,
    #[serde(default)]
    pub new_status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Target {
    Last,
    TitleContains(String),
}

impl Intent {
    fn unknown() -> Self {
        Intent {
            action: Action::Unknown,
            status: None,
            period: None,
            title: None,
            project: None,
            target: None,
            new_status: None,
        }
    }
}

pub async fn answer(state: &AppState, employee: Option<&Employee>, text: &str) -> Result<String> {
    let intent = analyze_intent(state, text).await;
    debug!(action = ?intent.action, "интент определен");

    let data_answer = execute_intent(&state.db, employee, &intent)?;

    if intent.action == Action::Unknown {
        return Ok(data_answer);
    }
    Ok(rephrase(state, text, &data_answer).await)
}

/// Asks the model for an intent JSON. Anything short of valid JSON with
/// a known action comes back as `unknown`.
async fn analyze_intent(state: &AppState, text: &str) -> Intent {
    let raw = match chat(state, intent_prompt(), text, true).await {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "интент-запрос не удался");
            return Intent::unknown();
        }
    };
    parse_intent(&raw)
}

pub fn parse_intent(raw: &str) -> Intent {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str::<Intent>(trimmed).unwrap_or_else(|err| {
        warn!(error = %err, "некорректный интент JSON");
        Intent::unknown()
    })
}

/// Runs the intent against the database. Pure of any model calls, so
/// tests drive it directly.
pub fn execute_intent(
    db: &Arc<Mutex<Database>>,
    employee: Option<&Employee>,
    intent: &Intent,
) -> Result<String> {
    let db = db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    let assignee_id = employee.map(|e| e.id.clone());

    match intent.action {
        Action::GetTasks => {
            let filter = TaskFilter {
                status: intent.status.as_deref().and_then(TaskStatus::parse),
                assignee_id,
                project_id: None,
                limit: Some(10),
            };
            Ok(format_tasks(&db.list_tasks(&filter)?))
        }
        Action::GetProjects => Ok(format_projects(&db.list_projects(
            Some(ProjectStatus::Active),
            10,
        )?)),
        Action::GetInvoices => {
            let mut invoices = db.list_invoice_summaries(50)?;
            if let Some(range) = intent.period.as_deref().and_then(|p| {
                parse_date_range(p, chrono::Utc::now().date_naive())
            }) {
                invoices.retain(|i| within_range(i.invoice_date.as_deref(), &range));
            }
            invoices.truncate(10);
            Ok(format_invoices(&invoices))
        }
        Action::CreateTask => {
            let title = intent
                .title
                .as_deref()
                .ok_or_else(|| anyhow!("Не указано название задачи"))?;
            let project_id = match intent.project.as_deref() {
                Some(needle) => db.find_project_by_title(needle)?.map(|p| p.id),
                None => None,
            };
            let now = now_rfc3339();
            let task = Task {
                id: uuid::Uuid::new_v4().to_string(),
                title: title.to_string(),
                description: None,
                status: TaskStatus::Todo,
                priority: 2,
                project_id,
                assignee_id,
                due_date: None,
                created_at: now.clone(),
                updated_at: now,
                completed_at: None,
            };
            db.upsert_task(&task)?;
            Ok(format!("✅ Задача создана: {}", task.title))
        }
        Action::UpdateTask => {
            let mut task = match &intent.target {
                Some(Target::Last) | None => db.latest_task(assignee_id.as_deref())?,
                Some(Target::TitleContains(needle)) => db.find_task_by_title(needle)?,
            }
            .ok_or_else(|| anyhow!("Задача не найдена"))?;

            let status = intent
                .new_status
                .as_deref()
                .and_then(TaskStatus::parse)
                .unwrap_or(TaskStatus::Done);
            task.status = status;
            task.updated_at = now_rfc3339();
            task.completed_at = if status == TaskStatus::Done {
                Some(now_rfc3339())
            } else {
                None
            };
            db.upsert_task(&task)?;
            Ok(format!(
                "✏️ Задача «{}» переведена в статус {}",
                task.title,
                status.as_str()
            ))
        }
        Action::Unknown => Ok("Я не понял запрос. Могу показать задачи, проекты и счета, \
             создать или обновить задачу. Команды: /tasks /projects /invoices /help"
            .to_string()),
    }
}

// ---- formatting ----

fn status_emoji(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Todo => "🆕",
        TaskStatus::InProgress => "🔄",
        TaskStatus::Blocked => "⛔",
        TaskStatus::Review => "👀",
        TaskStatus::Done => "✅",
    }
}

pub fn format_tasks(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "📋 Задач нет".to_string();
    }
    let mut out = format!("📋 Задачи ({}):\n", tasks.len());
    for task in tasks {
        out.push_str(&format!("{} {}", status_emoji(task.status), task.title));
        if let Some(due) = &task.due_date {
            out.push_str(&format!(" (до {})", due));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

pub fn format_projects(projects: &[Project]) -> String {
    if projects.is_empty() {
        return "🏗 Активных проектов нет".to_string();
    }
    let mut out = format!("🏗 Проекты ({}):\n", projects.len());
    for project in projects {
        out.push_str(&format!("• {} — {}", project.number, project.title));
        if let Some(client) = &project.client_name {
            out.push_str(&format!(", {}", client));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

pub fn format_invoices(invoices: &[InvoiceSummary]) -> String {
    if invoices.is_empty() {
        return "🧾 Счетов нет".to_string();
    }
    let total: f64 = invoices.iter().map(|i| i.total_amount).sum();
    let mut out = format!("🧾 Счета ({}):\n", invoices.len());
    for invoice in invoices {
        let number = invoice.invoice_number.as_deref().unwrap_or("б/н");
        let supplier = invoice.supplier_name.as_deref().unwrap_or("—");
        out.push_str(&format!(
            "• №{} от {} — {} руб, {}\n",
            number,
            invoice.invoice_date.as_deref().unwrap_or("—"),
            format_decimal(invoice.total_amount),
            supplier
        ));
    }
    out.push_str(&format!("Итого: {} руб", format_decimal(total)));
    out
}

// ---- date ranges ----

/// Resolves the relative period words the bot users actually type.
pub fn parse_date_range(word: &str, today: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    match word.trim().to_lowercase().as_str() {
        "сегодня" => Some((today, today)),
        "неделя" => Some((today - Duration::days(7), today)),
        "месяц" => Some((today - Duration::days(30), today)),
        _ => None,
    }
}

fn within_range(date: Option<&str>, range: &(NaiveDate, NaiveDate)) -> bool {
    let Some(date) = date.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) else {
        return false;
    };
    date >= range.0 && date <= range.1
}

// ---- chat plumbing ----

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

async fn chat(state: &AppState, system: &str, user: &str, json_mode: bool) -> Result<String> {
    let api_key = state.config.deepseek_api_key()?;
    let request = ChatRequest {
        model: MODEL.to_string(),
        temperature: 0.1,
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ],
        response_format: json_mode.then(|| ResponseFormat {
            format_type: "json_object".to_string(),
        }),
    };

    let response = state
        .http
        .post(DEEPSEEK_URL)
        .bearer_auth(api_key)
        .json(&request)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("DeepSeek error {}: {}", status, body));
    }

    let body: ChatResponse = response.json().await?;
    let content = body
        .choices
        .first()
        .ok_or_else(|| anyhow!("Пустой ответ модели"))?
        .message
        .content
        .trim()
        .to_string();
    Ok(content)
}

async fn rephrase(state: &AppState, question: &str, data_answer: &str) -> String {
    let prompt = format!(
        "Вопрос сотрудника: {}\nДанные из CRM:\n{}\n\nПерефразируй ответ коротко и дружелюбно, \
         сохрани все цифры и названия. Не выдумывай данных.",
        question, data_answer
    );
    match chat(state, "Ты помощник CRM остекления.", &prompt, false).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => data_answer.to_string(),
        Err(err) => {
            warn!(error = %err, "перефразирование не удалось, отдаем данные как есть");
            data_answer.to_string()
        }
    }
}

fn intent_prompt() -> &'static str {
    r#"Ты разбираешь запросы сотрудников CRM остекления. Верни только JSON:
{
  "action": "get_tasks" | "get_projects" | "get_invoices" | "create_task" | "update_task" | "unknown",
  "status": "todo|in_progress|blocked|review|done" | null,
  "period": "сегодня|неделя|месяц" | null,
  "title": "название новой задачи" | null,
  "project": "часть названия проекта" | null,
  "target": {"type": "last"} | {"type": "title_contains", "value": "..."} | null,
  "new_status": "todo|in_progress|blocked|review|done" | null
}
Если запрос не про задачи, проекты или счета — action = "unknown"."#
}
