use anyhow::{anyhow, Result};

use crate::models::{Project, ProjectStatus};
use crate::state::AppState;
use crate::utils::{now_rfc3339, parse_decimal};

pub struct NewProject {
    pub number: String,
    pub title: String,
    pub client_name: Option<String>,
    pub address: Option<String>,
    pub budget: Option<String>,
    pub due_date: Option<String>,
    pub description: Option<String>,
}

pub fn create_project(state: &AppState, payload: NewProject) -> Result<Project> {
    if payload.title.trim().is_empty() {
        return Err(anyhow!("Название проекта обязательно"));
    }

    let now = now_rfc3339();
    let project = Project {
        id: uuid::Uuid::new_v4().to_string(),
        number: payload.number,
        title: payload.title.trim().to_string(),
        client_name: payload.client_name,
        address: payload.address,
        status: ProjectStatus::Planning,
        budget: payload.budget.map(|b| parse_decimal(&b)).transpose()?,
        due_date: payload.due_date,
        description: payload.description,
        created_at: now.clone(),
        updated_at: now,
    };

    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    db.upsert_project(&project)?;
    Ok(project)
}

pub fn list_projects(
    state: &AppState,
    status: Option<&str>,
    limit: usize,
) -> Result<Vec<Project>> {
    let status = match status {
        Some(raw) => Some(
            ProjectStatus::parse(raw)
                .ok_or_else(|| anyhow!("Неизвестный статус проекта '{}'", raw))?,
        ),
        None => None,
    };
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    Ok(db.list_projects(status, limit)?)
}

pub fn set_project_status(state: &AppState, project_id: &str, status: &str) -> Result<()> {
    let status = ProjectStatus::parse(status)
        .ok_or_else(|| anyhow!("Неизвестный статус проекта '{}'", status))?;
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    let mut project = db
        .get_project(project_id)?
        .ok_or_else(|| anyhow!("Проект {} не найден", project_id))?;
    project.status = status;
    project.updated_at = now_rfc3339();
    db.upsert_project(&project)?;
    Ok(())
}

pub fn delete_project(state: &AppState, project_id: &str) -> Result<()> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    if !db.delete_project(project_id)? {
        return Err(anyhow!("Проект {} не найден", project_id));
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
    fn project_lifecycle() {
        let state = test_state();
        let project = create_project(
            &state,
            NewProject {
                number: "P-101".to_string(),
                title: "Остекление фасада, Лесная 5".to_string(),
                client_name: Some("ООО \"Заказчик\"".to_string()),
                address: None,
                budget: Some("1 500 000,00".to_string()),
                due_date: None,
                description: None,
            },
        )
        .unwrap();
        assert_eq!(project.status, ProjectStatus::Planning);
        assert_eq!(project.budget, Some(1_500_000.0));

        set_project_status(&state, &project.id, "active").unwrap();
        let active = list_projects(&state, Some("active"), 10).unwrap();
        assert_eq!(active.len(), 1);

        assert!(set_project_status(&state, &project.id, "finished").is_err());

        delete_project(&state, &project.id).unwrap();
        assert!(delete_project(&state, &project.id).is_err());
    }

    #[test]
    fn empty_title_is_rejected() {
        let state = test_state();
        let err = create_project(
            &state,
            NewProject {
                number: "P-1".to_string(),
                title: "  ".to_string(),
                client_name: None,
                address: None,
                budget: None,
                due_date: None,
                description: None,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("обязательно"));
    }
}
