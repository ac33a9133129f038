use anyhow::{anyhow, Result};
use chrono::{Datelike, Local};

use crate::models::DashboardStats;
use crate::state::AppState;

/// Spending overview: current month and year totals, unpaid backlog,
/// per-category breakdown and the latest rows.
pub fn get_dashboard_stats(state: &AppState, year_month: Option<String>) -> Result<DashboardStats> {
    let now = Local::now();
    let year_month =
        year_month.unwrap_or_else(|| format!("{}-{:02}", now.year(), now.month()));
    if year_month.len() < 7 {
        return Err(anyhow!("Ожидается период в формате ГГГГ-ММ"));
    }
    let year = &year_month[0..4];

    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    Ok(DashboardStats {
        month_total: db.monthly_total(&year_month)?,
        year_total: db.yearly_total(year)?,
        unpaid_total: db.unpaid_total()?,
        by_category: db.totals_by_category(year)?,
        recent_invoices: db.list_invoice_summaries(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::models::{ExpenseCategory, Invoice, Supplier};
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
        AppState::new(Database::open_in_memory().unwrap(), config)
    }

    fn seed(state: &AppState) {
        let db = state.db.lock().unwrap();
        db.insert_supplier(&Supplier {
            id: "s1".to_string(),
            name: "ООО \"Стекло\"".to_string(),
            inn: Some("7801514385".to_string()),
            category: ExpenseCategory::Materials,
            created_at: now_rfc3339(),
        })
        .unwrap();
        for (id, date, total) in [
            ("i1", "2024-03-10", 1000.0),
            ("i2", "2024-03-25", 500.0),
            ("i3", "2024-01-05", 200.0),
        ] {
            let now = now_rfc3339();
            db.upsert_invoice(&Invoice {
                id: id.to_string(),
                invoice_number: None,
                invoice_date: Some(date.to_string()),
                due_date: None,
                total_amount: total,
                vat_amount: None,
                vat_rate: None,
                supplier_id: Some("s1".to_string()),
                project_id: None,
                file_path: None,
                file_hash: None,
                ocr_text: None,
                status: "new".to_string(),
                paid_at: None,
                created_at: now.clone(),
                updated_at: now,
            })
            .unwrap();
        }
    }

    #[test]
    fn stats_for_a_fixed_month() {
        let state = test_state();
        seed(&state);
        let stats = get_dashboard_stats(&state, Some("2024-03".to_string())).unwrap();
        assert_eq!(stats.month_total, 1500.0);
        assert_eq!(stats.year_total, 1700.0);
        assert_eq!(stats.unpaid_total, 1700.0);
        assert_eq!(stats.by_category.len(), 1);
        assert_eq!(stats.by_category[0].category, "materials");
        assert_eq!(stats.recent_invoices.len(), 3);
    }

    #[test]
    fn malformed_period_is_rejected() {
        let state = test_state();
        assert!(get_dashboard_stats(&state, Some("2024".to_string())).is_err());
    }
}
