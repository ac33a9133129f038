use anyhow::{anyhow, Result};
use std::path::Path;

use crate::models::{Invoice, InvoiceSummary};
use crate::services::extract;
use crate::services::processor::{mark_failed, process_invoice_file};
use crate::state::AppState;
use crate::utils::{normalize_date, now_rfc3339, parse_decimal};

pub fn list_invoices(state: &AppState, limit: usize) -> Result<Vec<InvoiceSummary>> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    Ok(db.list_invoice_summaries(limit)?)
}

pub fn get_invoice(state: &AppState, invoice_id: &str) -> Result<Invoice> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    db.get_invoice(invoice_id)?
        .ok_or_else(|| anyhow!("Счет {} не найден", invoice_id))
}

/// Manual field correction after recognition. Unknown field names are a
/// validation error, not a silent no-op.
pub fn update_invoice_field(
    state: &AppState,
    invoice_id: &str,
    field: &str,
    value: &str,
) -> Result<()> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    let mut invoice = db
        .get_invoice(invoice_id)?
        .ok_or_else(|| anyhow!("Счет {} не найден", invoice_id))?;

    let some = |v: &str| {
        if v.trim().is_empty() {
            None
        } else {
            Some(v.trim().to_string())
        }
    };

    match field {
        "invoice_number" => invoice.invoice_number = some(value),
        "invoice_date" => invoice.invoice_date = normalize_date(some(value)),
        "due_date" => invoice.due_date = normalize_date(some(value)),
        "total_amount" => invoice.total_amount = parse_decimal(value)?,
        "vat_amount" => {
            invoice.vat_amount = some(value).map(|v| parse_decimal(&v)).transpose()?
        }
        "vat_rate" => invoice.vat_rate = some(value).map(|v| parse_decimal(&v)).transpose()?,
        "status" => {
            invoice.status = value.trim().to_string();
            if invoice.status != "paid" {
                invoice.paid_at = None;
            }
        }
        other => {
            return Err(anyhow!(
                "Поле '{}' нельзя редактировать. Доступны: invoice_number, invoice_date, \
                 due_date, total_amount, vat_amount, vat_rate, status",
                other
            ))
        }
    }

    invoice.updated_at = now_rfc3339();
    db.upsert_invoice(&invoice)?;
    Ok(())
}

pub fn list_for_project(state: &AppState, project_id: &str) -> Result<Vec<Invoice>> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    db.get_project(project_id)?
        .ok_or_else(|| anyhow!("Проект {} не найден", project_id))?;
    Ok(db.list_invoices_for_project(project_id)?)
}

pub fn mark_paid(state: &AppState, invoice_id: &str) -> Result<()> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    if !db.mark_invoice_paid(invoice_id)? {
        return Err(anyhow!("Счет {} не найден", invoice_id));
    }
    Ok(())
}

pub fn attach_to_project(state: &AppState, invoice_id: &str, project_id: &str) -> Result<()> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    let mut invoice = db
        .get_invoice(invoice_id)?
        .ok_or_else(|| anyhow!("Счет {} не найден", invoice_id))?;
    let project = db
        .get_project(project_id)?
        .ok_or_else(|| anyhow!("Проект {} не найден", project_id))?;

    invoice.project_id = Some(project.id);
    invoice.updated_at = now_rfc3339();
    db.upsert_invoice(&invoice)?;
    Ok(())
}

/// Full pipeline for one file; on failure the stored row (if any) is
/// marked failed before the error is returned.
pub async fn process_file(state: &AppState, path: &Path) -> Result<Invoice> {
    match process_invoice_file(state, path).await {
        Ok(invoice) => Ok(invoice),
        Err(err) => {
            let invoice = {
                let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
                db.get_invoice_by_path(&path.to_string_lossy())?
            };
            if let Some(mut invoice) = invoice {
                let _ = mark_failed(&state.db, &mut invoice, &err.to_string());
            }
            Err(err)
        }
    }
}

/// Extraction heuristic alone, for testing patterns against raw text
/// without touching the database.
pub fn parse_text(text: &str) -> Result<String> {
    if !extract::is_invoice_document(text) {
        return Err(anyhow!(
            "Документ не похож на счет. Загрузите счет-фактуру или коммерческое предложение"
        ));
    }
    let parsed = extract::extract(text);
    Ok(serde_json::to_string_pretty(&parsed)?)
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

    fn seed_invoice(state: &AppState, id: &str) {
        let now = now_rfc3339();
        state
            .db
            .lock()
            .unwrap()
            .upsert_invoice(&Invoice {
                id: id.to_string(),
                invoice_number: Some("УТ-784".to_string()),
                invoice_date: Some("2024-03-15".to_string()),
                due_date: None,
                total_amount: 1000.0,
                vat_amount: None,
                vat_rate: None,
                supplier_id: None,
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

    #[test]
    fn field_update_normalizes_values() {
        let state = test_state();
        seed_invoice(&state, "i1");

        update_invoice_field(&state, "i1", "total_amount", "54 971,20").unwrap();
        update_invoice_field(&state, "i1", "invoice_date", "20.03.2024").unwrap();

        let invoice = get_invoice(&state, "i1").unwrap();
        assert_eq!(invoice.total_amount, 54971.20);
        assert_eq!(invoice.invoice_date.as_deref(), Some("2024-03-20"));
    }

    #[test]
    fn unknown_field_is_a_validation_error() {
        let state = test_state();
        seed_invoice(&state, "i1");
        let err = update_invoice_field(&state, "i1", "file_hash", "x").unwrap_err();
        assert!(err.to_string().contains("нельзя редактировать"));
    }

    #[test]
    fn mark_paid_sets_status() {
        let state = test_state();
        seed_invoice(&state, "i1");
        mark_paid(&state, "i1").unwrap();
        let invoice = get_invoice(&state, "i1").unwrap();
        assert_eq!(invoice.status, "paid");
        assert!(invoice.paid_at.is_some());
        assert!(mark_paid(&state, "missing").is_err());
    }

    #[test]
    fn parse_text_rejects_non_invoices() {
        assert!(parse_text("Анкета участника торгов").is_err());
        let json = parse_text("СЧЕТ № 784 от 15.03.2024 Итого: 500,50 руб").unwrap();
        assert!(json.contains("\"784\""));
        assert!(json.contains("500.5"));
    }
}
