use anyhow::{anyhow, Result};

use crate::models::Shift;
use crate::state::AppState;
use crate::utils::{normalize_date, today_iso};

pub struct NewShift {
    pub employee_id: String,
    pub project_id: Option<String>,
    pub shift_date: Option<String>,
    pub hours: f64,
    pub note: Option<String>,
}

/// Records a worked shift. Date defaults to today; hours are sanity
/// checked against a 24-hour day.
pub fn record_shift(state: &AppState, payload: NewShift) -> Result<Shift> {
    if !(payload.hours > 0.0 && payload.hours <= 24.0) {
        return Err(anyhow!("Часы смены должны быть от 0 до 24"));
    }

    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    db.get_employee(&payload.employee_id)?
        .ok_or_else(|| anyhow!("Сотрудник {} не найден", payload.employee_id))?;
    if let Some(project_id) = &payload.project_id {
        db.get_project(project_id)?
            .ok_or_else(|| anyhow!("Проект {} не найден", project_id))?;
    }

    let shift = Shift {
        id: uuid::Uuid::new_v4().to_string(),
        employee_id: payload.employee_id,
        project_id: payload.project_id,
        shift_date: normalize_date(payload.shift_date).unwrap_or_else(today_iso),
        hours: payload.hours,
        note: payload.note,
    };
    db.insert_shift(&shift)?;
    Ok(shift)
}

pub fn list_shifts(state: &AppState, employee_id: &str) -> Result<Vec<Shift>> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    Ok(db.list_shifts_for_employee(employee_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::models::Employee;
    use crate::utils::now_rfc3339;

    fn test_state() -> AppState {
        let config = Config {
            database_path: ":memory:".to_string(),
            telegram_bot_token: None,
            yandex_vision_api_key: None,
            yandex_folder_id: None,
            deepseek_api_key: None,
            retrain_script: None,
        };
        let state = AppState::new(Database::open_in_memory().unwrap(), config);
        state
            .db
            .lock()
            .unwrap()
            .insert_employee(&Employee {
                id: "e1".to_string(),
                full_name: "Иван".to_string(),
                role: Some("монтажник".to_string()),
                phone: None,
                telegram_id: None,
                telegram_username: None,
                created_at: now_rfc3339(),
            })
            .unwrap();
        state
    }

    #[test]
    fn shift_roundtrip_with_date_normalization() {
        let state = test_state();
        let shift = record_shift(
            &state,
            NewShift {
                employee_id: "e1".to_string(),
                project_id: None,
                shift_date: Some("15.03.2024".to_string()),
                hours: 8.0,
                note: Some("монтаж витража".to_string()),
            },
        )
        .unwrap();
        assert_eq!(shift.shift_date, "2024-03-15");

        let shifts = list_shifts(&state, "e1").unwrap();
        assert_eq!(shifts.len(), 1);
        assert_eq!(shifts[0].hours, 8.0);
    }

    #[test]
    fn hours_and_employee_are_validated() {
        let state = test_state();
        assert!(record_shift(
            &state,
            NewShift {
                employee_id: "e1".to_string(),
                project_id: None,
                shift_date: None,
                hours: 30.0,
                note: None,
            },
        )
        .is_err());
        assert!(record_shift(
            &state,
            NewShift {
                employee_id: "нет".to_string(),
                project_id: None,
                shift_date: None,
                hours: 8.0,
                note: None,
            },
        )
        .is_err());
    }
}
