use anyhow::{anyhow, Result};

use crate::models::{ExpenseCategory, Supplier};
use crate::state::AppState;
use crate::utils::now_rfc3339;

pub fn add_supplier(
    state: &AppState,
    name: &str,
    inn: Option<&str>,
    category: Option<&str>,
) -> Result<Supplier> {
    if name.trim().is_empty() {
        return Err(anyhow!("Название поставщика обязательно"));
    }
    if let Some(inn) = inn {
        if inn.len() != 10 && inn.len() != 12 || !inn.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!("ИНН должен содержать 10 или 12 цифр"));
        }
    }
    let category = match category {
        Some(raw) => ExpenseCategory::parse(raw)
            .ok_or_else(|| anyhow!("Неизвестная категория расходов '{}'", raw))?,
        None => ExpenseCategory::Other,
    };

    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    if let Some(inn) = inn {
        if db.find_supplier_by_inn(inn)?.is_some() {
            return Err(anyhow!("Поставщик с ИНН {} уже существует", inn));
        }
    }

    let supplier = Supplier {
        id: uuid::Uuid::new_v4().to_string(),
        name: name.trim().to_string(),
        inn: inn.map(|s| s.to_string()),
        category,
        created_at: now_rfc3339(),
    };
    db.insert_supplier(&supplier)?;
    Ok(supplier)
}

pub fn list_suppliers(state: &AppState) -> Result<Vec<Supplier>> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    Ok(db.list_suppliers()?)
}

pub fn set_supplier_category(state: &AppState, supplier_id: &str, category: &str) -> Result<()> {
    let category = ExpenseCategory::parse(category)
        .ok_or_else(|| anyhow!("Неизвестная категория расходов '{}'", category))?;
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    let supplier = db
        .get_supplier(supplier_id)?
        .ok_or_else(|| anyhow!("Поставщик {} не найден", supplier_id))?;
    db.update_supplier_category(&supplier.id, category)?;
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
    fn supplier_inn_is_validated_and_unique() {
        let state = test_state();
        add_supplier(&state, "ООО \"СМ Групп\"", Some("7801514385"), Some("materials")).unwrap();

        let err = add_supplier(&state, "Дубль", Some("7801514385"), None).unwrap_err();
        assert!(err.to_string().contains("уже существует"));

        let err = add_supplier(&state, "Кривой ИНН", Some("123"), None).unwrap_err();
        assert!(err.to_string().contains("10 или 12"));
    }

    #[test]
    fn category_change() {
        let state = test_state();
        let supplier = add_supplier(&state, "Транспорт СПб", None, None).unwrap();
        assert_eq!(supplier.category, ExpenseCategory::Other);

        set_supplier_category(&state, &supplier.id, "transport").unwrap();
        let suppliers = list_suppliers(&state).unwrap();
        assert_eq!(suppliers[0].category, ExpenseCategory::Transport);
    }
}
