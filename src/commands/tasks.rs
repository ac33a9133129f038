use anyhow::{anyhow, Result};

use crate::db::TaskFilter;
use crate::models::{Task, TaskStatus};
use crate::state::AppState;
use crate::utils::{normalize_date, now_rfc3339};

pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub project_id: Option<String>,
    pub assignee_id: Option<String>,
    pub due_date: Option<String>,
}

pub fn create_task(state: &AppState, payload: NewTask) -> Result<Task> {
    if payload.title.trim().is_empty() {
        return Err(anyhow!("Название задачи обязательно"));
    }
    let priority = payload.priority.unwrap_or(2);
    if !(1..=3).contains(&priority) {
        return Err(anyhow!("Приоритет должен быть 1, 2 или 3"));
    }

    let now = now_rfc3339();
    let task = Task {
        id: uuid::Uuid::new_v4().to_string(),
        title: payload.title.trim().to_string(),
        description: payload.description,
        status: TaskStatus::Todo,
        priority,
        project_id: payload.project_id,
        assignee_id: payload.assignee_id,
        due_date: normalize_date(payload.due_date),
        created_at: now.clone(),
        updated_at: now,
        completed_at: None,
    };

    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    db.upsert_task(&task)?;
    Ok(task)
}

pub fn list_tasks(state: &AppState, filter: &TaskFilter) -> Result<Vec<Task>> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    Ok(db.list_tasks(filter)?)
}

pub fn set_task_status(state: &AppState, task_id: &str, status: &str) -> Result<()> {
    let status =
        TaskStatus::parse(status).ok_or_else(|| anyhow!("Неизвестный статус задачи '{}'", status))?;
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    let mut task = db
        .get_task(task_id)?
        .ok_or_else(|| anyhow!("Задача {} не найдена", task_id))?;
    task.status = status;
    task.updated_at = now_rfc3339();
    task.completed_at = if status == TaskStatus::Done {
        Some(now_rfc3339())
    } else {
        None
    };
    db.upsert_task(&task)?;
    Ok(())
}

pub fn delete_task(state: &AppState, task_id: &str) -> Result<()> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    if !db.delete_task(task_id)? {
        return Err(anyhow!("Задача {} не найдена", task_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;

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
    fn task_lifecycle_with_legacy_status_input() {
        let state = test_state();
        let task = create_task(
            &state,
            NewTask {
                title: "Замер на объекте".to_string(),
                description: None,
                priority: Some(1),
                project_id: None,
                assignee_id: None,
                due_date: Some("20.03.2024".to_string()),
            },
        )
        .unwrap();
        assert_eq!(task.due_date.as_deref(), Some("2024-03-20"));

        // Old pages used "completed"; it maps onto the canonical set.
        set_task_status(&state, &task.id, "completed").unwrap();
        let stored = state.db.lock().unwrap().get_task(&task.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Done);
        assert!(stored.completed_at.is_some());

        delete_task(&state, &task.id).unwrap();
    }

    #[test]
    fn priority_is_validated() {
        let state = test_state();
        let err = create_task(
            &state,
            NewTask {
                title: "x".to_string(),
                description: None,
                priority: Some(5),
                project_id: None,
                assignee_id: None,
                due_date: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("Приоритет"));
    }
}
