//! Telegram bot: long-polling `getUpdates` loop, slash-command dispatch,
//! free text handed to the data agent.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::ChatMessage;
use crate::services::agent;
use crate::state::AppState;
use crate::utils::now_rfc3339;

const POLL_TIMEOUT_SECS: u64 = 30;
const LINK_CODE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub from: Option<TelegramUser>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Deserialize)]
struct ApiReply<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

/// Polls Telegram until the process is stopped. Per-update failures are
/// logged and skipped; the loop itself only exits on a missing token.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let token = state.config.telegram_bot_token()?.to_string();
    info!("бот запущен, слушаем обновления");

    let mut offset: i64 = 0;
    loop {
        match get_updates(&state, &token, offset).await {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    if let Err(err) = handle_update(&state, &token, update).await {
                        warn!(error = %err, "обновление не обработано");
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "getUpdates не удался, ждем");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            }
        }
    }
}

async fn get_updates(state: &AppState, token: &str, offset: i64) -> Result<Vec<Update>> {
    let url = format!("https://api.telegram.org/bot{}/getUpdates", token);
    let response = state
        .http
        .get(&url)
        .query(&[
            ("offset", offset.to_string()),
            ("timeout", POLL_TIMEOUT_SECS.to_string()),
        ])
        .send()
        .await?;

    let body: ApiReply<Vec<Update>> = response.json().await?;
    if !body.ok {
        return Err(anyhow!(
            "Telegram getUpdates: {}",
            body.description.unwrap_or_default()
        ));
    }
    Ok(body.result.unwrap_or_default())
}

async fn handle_update(state: &AppState, token: &str, update: Update) -> Result<()> {
    let Some(message) = update.message else {
        return Ok(());
    };
    let Some(text) = message.text.as_deref() else {
        return Ok(());
    };
    let chat_id = message.chat.id;
    let from = message.from.as_ref();
    let telegram_id = from.map(|u| u.id).unwrap_or(chat_id);
    let username = from.and_then(|u| u.username.as_deref());

    let employee = {
        let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
        db.find_employee_by_telegram_id(telegram_id)?
    };

    let reply = match text.trim() {
        "/start" => {
            let code = issue_link_code(state, telegram_id, username)?;
            format!(
                "Привет! Я бот Stella CRM.\n\n\
                 Код для привязки аккаунта: **{}** (действует {} минут).\n\
                 Передайте его администратору.\n\n{}",
                code,
                LINK_CODE_TTL_MINUTES,
                help_text()
            )
        }
        "/help" => help_text().to_string(),
        "/tasks" => {
            let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
            let filter = crate::db::TaskFilter {
                assignee_id: employee.as_ref().map(|e| e.id.clone()),
                limit: Some(10),
                ..Default::default()
            };
            agent::format_tasks(&db.list_tasks(&filter)?)
        }
        "/projects" => {
            let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
            agent::format_projects(&db.list_projects(
                Some(crate::models::ProjectStatus::Active),
                10,
            )?)
        }
        "/invoices" => {
            let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
            agent::format_invoices(&db.list_invoice_summaries(10)?)
        }
        other if other.starts_with('/') => {
            format!("Неизвестная команда {}.\n\n{}", other, help_text())
        }
        other => match &employee {
            None => {
                let code = issue_link_code(state, telegram_id, username)?;
                format!(
                    "Ваш аккаунт еще не привязан. Код для привязки: **{}** \
                     (действует {} минут). После привязки я смогу отвечать на вопросы.",
                    code, LINK_CODE_TTL_MINUTES
                )
            }
            Some(employee) => {
                {
                    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
                    db.insert_message(&ChatMessage {
                        id: uuid::Uuid::new_v4().to_string(),
                        employee_id: Some(employee.id.clone()),
                        body: other.to_string(),
                        sent_at: now_rfc3339(),
                    })?;
                }
                agent::answer(state, Some(employee), other).await?
            }
        },
    };

    send_message(state, token, chat_id, &reply).await
}

fn help_text() -> &'static str {
    "Команды:\n\
     /tasks — ваши задачи\n\
     /projects — активные проекты\n\
     /invoices — последние счета\n\
     /help — эта справка\n\n\
     Или просто напишите вопрос, например «какие счета за неделю»."
}

/// Stores a fresh 6-digit code for the account, replacing any previous
/// one. The code is consumed by the `link` command on the operator side.
pub fn issue_link_code(
    state: &AppState,
    telegram_id: i64,
    username: Option<&str>,
) -> Result<String> {
    let code = format!(
        "{:06}",
        uuid::Uuid::new_v4().as_u128() % 900_000 + 100_000
    );
    let expires_at = (chrono::Utc::now() + chrono::Duration::minutes(LINK_CODE_TTL_MINUTES))
        .to_rfc3339();
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    db.store_link_code(telegram_id, username, &code, &expires_at)?;
    info!(telegram_id, "выдан код привязки");
    Ok(code)
}

pub async fn send_message(state: &AppState, token: &str, chat_id: i64, text: &str) -> Result<()> {
    let url = format!("https://api.telegram.org/bot{}/sendMessage", token);
    let formatted = format_for_telegram(text);

    let response = state
        .http
        .post(&url)
        .json(&SendMessage {
            chat_id,
            text: &formatted,
            parse_mode: Some("Markdown"),
        })
        .send()
        .await?;

    let body: ApiReply<serde_json::Value> = response.json().await?;
    if body.ok {
        return Ok(());
    }

    // Unbalanced markup makes Telegram reject the message; send the
    // text as-is rather than dropping the answer.
    warn!(
        description = body.description.as_deref().unwrap_or(""),
        "Markdown отклонен, отправляем без разметки"
    );
    let response = state
        .http
        .post(&url)
        .json(&SendMessage {
            chat_id,
            text: &formatted,
            parse_mode: None,
        })
        .send()
        .await?;
    let body: ApiReply<serde_json::Value> = response.json().await?;
    if !body.ok {
        return Err(anyhow!(
            "Telegram sendMessage: {}",
            body.description.unwrap_or_default()
        ));
    }
    Ok(())
}

/// Telegram's legacy Markdown wants single asterisks for bold and has
/// no header syntax at all.
pub fn format_for_telegram(text: &str) -> String {
    text.replace("**", "*")
        .lines()
        .map(|line| line.trim_start_matches("## ").trim_start_matches("# "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Consumes a link code and attaches the Telegram account to an
/// employee. Expired codes are rejected with a distinct message.
pub fn link_employee_by_code(state: &AppState, code: &str, employee_id: &str) -> Result<String> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;

    let (telegram_id, username, expires_at) = db
        .take_link_code(code)?
        .ok_or_else(|| anyhow!("Код не найден. Попросите сотрудника отправить /start боту"))?;

    let expired = chrono::DateTime::parse_from_rfc3339(&expires_at)
        .map(|t| t < chrono::Utc::now())
        .unwrap_or(true);
    if expired {
        return Err(anyhow!(
            "Код истек. Попросите сотрудника запросить новый через /start"
        ));
    }

    let employee = db
        .get_employee(employee_id)?
        .ok_or_else(|| anyhow!("Сотрудник {} не найден", employee_id))?;
    db.link_telegram(&employee.id, telegram_id, username.as_deref())?;

    Ok(format!(
        "Telegram-аккаунт {} привязан к сотруднику {}",
        telegram_id, employee.full_name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::models::Employee;

    fn test_state() -> AppState {
        let config = Config {
            database_path: ":memory:".to_string(),
            telegram_bot_token: None,
            yandex_vision_api_key: None,
            yandex_folder_id: None,
            deepseek_api_key: None,
            retrain_script: None,
        };
        AppState::new(Database::open_in_memory().unwrap(), config)
    }

    #[test]
    fn markdown_is_downgraded_for_telegram() {
        let text = "## Отчет\n**Итого**: 100 руб";
        assert_eq!(format_for_telegram(text), "Отчет\n*Итого*: 100 руб");
    }

    #[test]
    fn link_code_roundtrip() {
        let state = test_state();
        {
            let db = state.db.lock().unwrap();
            db.insert_employee(&Employee {
                id: "e1".to_string(),
                full_name: "Сергей Ткачев".to_string(),
                role: Some("монтажник".to_string()),
                phone: None,
                telegram_id: None,
                telegram_username: None,
                created_at: now_rfc3339(),
            })
            .unwrap();
        }

        let code = issue_link_code(&state, 42, Some("sergey")).unwrap();
        assert_eq!(code.len(), 6);

        let reply = link_employee_by_code(&state, &code, "e1").unwrap();
        assert!(reply.contains("Сергей Ткачев"));

        let db = state.db.lock().unwrap();
        let employee = db.find_employee_by_telegram_id(42).unwrap().unwrap();
        assert_eq!(employee.id, "e1");
        assert_eq!(employee.telegram_username.as_deref(), Some("sergey"));
    }

    #[test]
    fn used_and_unknown_codes_are_rejected() {
        let state = test_state();
        {
            let db = state.db.lock().unwrap();
            db.insert_employee(&Employee {
                id: "e1".to_string(),
                full_name: "Иван".to_string(),
                role: None,
                phone: None,
                telegram_id: None,
                telegram_username: None,
                created_at: now_rfc3339(),
            })
            .unwrap();
        }

        assert!(link_employee_by_code(&state, "000000", "e1").is_err());

        let code = issue_link_code(&state, 42, None).unwrap();
        link_employee_by_code(&state, &code, "e1").unwrap();
        // Single use.
        assert!(link_employee_by_code(&state, &code, "e1").is_err());
    }

    #[test]
    fn expired_code_gets_distinct_error() {
        let state = test_state();
        {
            let db = state.db.lock().unwrap();
            db.insert_employee(&Employee {
                id: "e1".to_string(),
                full_name: "Иван".to_string(),
                role: None,
                phone: None,
                telegram_id: None,
                telegram_username: None,
                created_at: now_rfc3339(),
            })
            .unwrap();
            db.store_link_code(42, None, "123456", "2020-01-01T00:00:00+00:00")
                .unwrap();
        }
        let err = link_employee_by_code(&state, "123456", "e1").unwrap_err();
        assert!(err.to_string().contains("истек"));
    }
}
