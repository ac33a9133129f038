//! Parser training loop: capture human corrections, report extraction
//! quality over them, hand the accumulated data to an external retrain
//! script.

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::info;

use crate::models::{ParsedInvoice, ParserCorrection};
use crate::services::extract;
use crate::state::AppState;
use crate::utils::now_rfc3339;

#[derive(Debug, Serialize)]
pub struct QualityReport {
    pub corrections: usize,
    pub average_score: Option<f64>,
    pub per_invoice: Vec<InvoiceScore>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceScore {
    pub invoice_id: String,
    pub score: Option<f64>,
}

/// Saves the human-corrected fields next to the OCR text the extractor
/// saw, so the quality report can replay them later.
pub fn record_correction(
    state: &AppState,
    invoice_id: &str,
    corrected: ParsedInvoice,
) -> Result<()> {
    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    let invoice = db
        .get_invoice(invoice_id)?
        .ok_or_else(|| anyhow!("Счет {} не найден", invoice_id))?;
    let ocr_text = invoice
        .ocr_text
        .ok_or_else(|| anyhow!("У счета {} нет распознанного текста", invoice_id))?;

    db.insert_correction(&ParserCorrection {
        id: uuid::Uuid::new_v4().to_string(),
        invoice_id: invoice_id.to_string(),
        ocr_text,
        corrected,
        created_at: now_rfc3339(),
    })?;
    Ok(())
}

/// Re-runs the extractor over every stored correction and scores it
/// against the human reference.
pub fn quality_report(state: &AppState) -> Result<QualityReport> {
    let corrections = {
        let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
        db.list_corrections()?
    };

    let mut per_invoice = Vec::with_capacity(corrections.len());
    let mut scores = Vec::new();
    for correction in &corrections {
        let parsed = extract::extract(&correction.ocr_text);
        let score = extract::quality_score(&parsed, &correction.corrected);
        if let Some(score) = score {
            scores.push(score);
        }
        per_invoice.push(InvoiceScore {
            invoice_id: correction.invoice_id.clone(),
            score,
        });
    }

    let average_score = if scores.is_empty() {
        None
    } else {
        Some(scores.iter().sum::<f64>() / scores.len() as f64)
    };

    Ok(QualityReport {
        corrections: corrections.len(),
        average_score,
        per_invoice,
    })
}

/// Dumps the corrections to a JSON file and runs the configured script
/// over it. The script itself is an external collaborator.
pub fn retrain(state: &AppState) -> Result<String> {
    let script = state
        .config
        .retrain_script
        .as_deref()
        .ok_or_else(|| anyhow!("RETRAIN_SCRIPT не задан"))?;

    let corrections = {
        let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
        db.list_corrections()?
    };
    if corrections.is_empty() {
        return Err(anyhow!("Нет сохраненных исправлений для обучения"));
    }

    let dataset_path = std::env::temp_dir().join("stella-corrections.json");
    std::fs::write(&dataset_path, serde_json::to_vec_pretty(&corrections)?)?;

    info!(script, examples = corrections.len(), "запускаем переобучение");
    let output = std::process::Command::new(script)
        .arg(&dataset_path)
        .output()
        .map_err(|e| anyhow!("Не удалось запустить {}: {}", script, e))?;

    if !output.status.success() {
        return Err(anyhow!(
            "Скрипт обучения завершился с ошибкой: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
