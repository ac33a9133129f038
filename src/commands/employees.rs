use anyhow::{anyhow, Result};

use crate::models::Employee;
use crate::services::telegram;
use crate::state::AppState;
use crate::utils::now_rfc3339;

pub fn add_employee(
    state: &AppState,
    full_name: &str,
    role: Option<&str>,
    phone: Option<&str>,
) -> Result<Employee> {
    if full_name.trim().is_empty() {
        return Err(anyhow!("Имя сотрудника обязательно"));
    }
    let employee = Employee {
        id: uuid::Uuid::new_v4().to_string(),
        full_name: full_name.trim().to_string(),
        role: role.map(|s| s.to_string()),
        phone: phone.map(|s| s.to_string()),
        telegram_id: None,
        telegram_username: None,
        created_at: now_rfc3339(),
    };
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    db.insert_employee(&employee)?;
    Ok(employee)
}

pub fn list_employees(state: &AppState) -> Result<Vec<Employee>> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    Ok(db.list_employees()?)
}

/// Operator side of the Telegram linking flow: the employee gets a code
/// from the bot, the operator redeems it here.
pub fn link_telegram(state: &AppState, code: &str, employee_id: &str) -> Result<String> {
    telegram::link_employee_by_code(state, code, employee_id)
}
