//! Recognition pipeline: file on disk to invoice row.
//!
//! One document per call, sequential awaited steps. A repeated run over
//! an unchanged file short-circuits on the stored content hash.

use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::db::Database;
use crate::models::{Attachment, ExpenseCategory, Invoice, ParsedInvoice, Supplier};
use crate::services::convert;
use crate::services::extract;
use crate::services::ocr::VisionClient;
use crate::state::AppState;
use crate::utils::{is_image, is_pdf, now_rfc3339, sha256_file};

pub async fn process_invoice_file(state: &AppState, path: &Path) -> Result<Invoice> {
    let file_path = path.to_string_lossy().to_string();
    let file_hash = sha256_file(path)?;

    let existing = {
        let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
        db.get_invoice_by_path(&file_path)?
    };

    if let Some(existing) = &existing {
        if existing.file_hash.as_deref() == Some(file_hash.as_str()) {
            info!(path = %file_path, "файл не изменился, пропускаем");
            return Ok(existing.clone());
        }
    }

    let text = document_text(state, path).await?;

    if !extract::is_invoice_document(&text) {
        return Err(anyhow!(
            "Документ не похож на счет. Загрузите счет-фактуру или коммерческое предложение"
        ));
    }

    let parsed = extract::extract(&text);
    let supplier_id = get_or_create_supplier(&state.db, &parsed)?;

    let now = now_rfc3339();
    let is_new = existing.is_none();
    let mut invoice = existing.unwrap_or_else(|| Invoice {
        id: uuid::Uuid::new_v4().to_string(),
        invoice_number: None,
        invoice_date: None,
        due_date: None,
        total_amount: 0.0,
        vat_amount: None,
        vat_rate: None,
        supplier_id: None,
        project_id: None,
        file_path: Some(file_path.clone()),
        file_hash: None,
        ocr_text: None,
        status: "new".to_string(),
        paid_at: None,
        created_at: now.clone(),
        updated_at: now.clone(),
    });

    invoice.file_path = Some(file_path);
    invoice.file_hash = Some(file_hash);
    invoice.ocr_text = Some(text);
    invoice.invoice_number = parsed.invoice_number.clone();
    invoice.invoice_date = parsed.invoice_date.clone();
    invoice.due_date = parsed.due_date.clone();
    invoice.total_amount = parsed.total_amount.unwrap_or(0.0);
    invoice.vat_amount = parsed.vat_amount;
    invoice.vat_rate = parsed.vat_rate;
    invoice.supplier_id = supplier_id;
    invoice.updated_at = now_rfc3339();

    {
        let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
        db.upsert_invoice(&invoice)?;
        if is_new {
            db.insert_attachment(&Attachment {
                id: uuid::Uuid::new_v4().to_string(),
                invoice_id: Some(invoice.id.clone()),
                project_id: None,
                file_name: path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
                file_path: invoice.file_path.clone().unwrap_or_default(),
                mime_type: Some(mime_of(path).to_string()),
                created_at: now_rfc3339(),
            })?;
        }
        db.log_processing(
            Some(&invoice.id),
            invoice.file_hash.as_deref(),
            "process",
            "success",
            None,
        )?;
    }

    info!(
        id = %invoice.id,
        number = ?invoice.invoice_number,
        total = invoice.total_amount,
        "счет распознан"
    );
    Ok(invoice)
}

pub fn mark_failed(
    db: &Arc<Mutex<Database>>,
    invoice: &mut Invoice,
    message: &str,
) -> Result<()> {
    invoice.status = "failed".to_string();
    invoice.updated_at = now_rfc3339();
    let db = db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
    db.upsert_invoice(invoice)?;
    db.log_processing(
        Some(&invoice.id),
        invoice.file_hash.as_deref(),
        "process",
        "failed",
        Some(message),
    )?;
    Ok(())
}

fn mime_of(path: &Path) -> &'static str {
    if is_pdf(path) {
        "application/pdf"
    } else if path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
    {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// Plain text for the document: PDF text layer when present, otherwise
/// conversion to PNG and a Vision OCR round trip.
async fn document_text(state: &AppState, path: &Path) -> Result<String> {
    if is_pdf(path) {
        if let Some(text) = convert::pdf_text_layer(path) {
            info!(path = %path.display(), "использован текстовый слой PDF");
            return Ok(text);
        }
        let (image, notes) = convert::pdf_to_png(path)
            .map_err(|e| anyhow!("Не удалось конвертировать PDF: {}", e))?;
        info!(notes = notes.join("; "), "PDF сконвертирован");
        return recognize(state, &image).await;
    }

    if is_image(path) {
        let image = std::fs::read(path)?;
        return recognize(state, &image).await;
    }

    Err(anyhow!(
        "Неподдерживаемый формат файла: {}. Ожидается PDF, PNG или JPEG",
        path.display()
    ))
}

async fn recognize(state: &AppState, image: &[u8]) -> Result<String> {
    let api_key = state.config.yandex_vision_api_key()?;
    let client = VisionClient::new(
        state.http.clone(),
        api_key,
        state.config.yandex_folder_id.as_deref(),
    );
    let recognized = client.recognize(image).await?;
    if recognized.text.trim().is_empty() {
        return Err(anyhow!("OCR не нашел текста в документе"));
    }
    Ok(recognized.text)
}

/// Supplier lookup in the order the extraction gives us confidence:
/// by INN first, then by exact name, otherwise a new row.
pub fn get_or_create_supplier(
    db: &Arc<Mutex<Database>>,
    parsed: &ParsedInvoice,
) -> Result<Option<String>> {
    let db = db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;

    if let Some(inn) = &parsed.supplier_inn {
        if let Some(supplier) = db.find_supplier_by_inn(inn)? {
            return Ok(Some(supplier.id));
        }
    }
    if let Some(name) = &parsed.supplier_name {
        if let Some(supplier) = db.find_supplier_by_name(name)? {
            return Ok(Some(supplier.id));
        }
    }

    if parsed.supplier_name.is_none() && parsed.supplier_inn.is_none() {
        return Ok(None);
    }

    let supplier = Supplier {
        id: uuid::Uuid::new_v4().to_string(),
        name: parsed
            .supplier_name
            .clone()
            .unwrap_or_else(|| "Поставщик без названия".to_string()),
        inn: parsed.supplier_inn.clone(),
        category: ExpenseCategory::Other,
        created_at: now_rfc3339(),
    };
    db.insert_supplier(&supplier)?;
    info!(name = %supplier.name, inn = ?supplier.inn, "создан новый поставщик");
    Ok(Some(supplier.id))
}

/// Processes every PDF/image in a folder, one after another. Failures
/// are logged and counted, the loop keeps going.
pub async fn scan_folder(state: &AppState, folder: &Path) -> Result<(usize, usize)> {
    let entries: Vec<_> = walkdir::WalkDir::new(folder)
        .max_depth(2)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| is_pdf(e.path()) || is_image(e.path()))
        .map(|e| e.path().to_path_buf())
        .collect();

    let mut processed = 0;
    let mut failed = 0;
    for path in entries {
        match process_invoice_file(state, &path).await {
            Ok(_) => processed += 1,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "файл не обработан");
                let invoice = {
                    let db = state.db.lock().map_err(|_| anyhow!("DB lock poisoned"))?;
                    db.get_invoice_by_path(&path.to_string_lossy())?
                };
                if let Some(mut invoice) = invoice {
                    let _ = mark_failed(&state.db, &mut invoice, &err.to_string());
                }
                failed += 1;
            }
        }
    }

    Ok((processed, failed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn db_handle() -> Arc<Mutex<Database>> {
        Arc::new(Mutex::new(Database::open_in_memory().unwrap()))
    }

    #[test]
    fn supplier_created_once_then_found_by_inn() {
        let db = db_handle();
        let parsed = ParsedInvoice {
            supplier_name: Some("ООО \"СМ Групп\"".to_string()),
            supplier_inn: Some("7801514385".to_string()),
            ..Default::default()
        };

        let first = get_or_create_supplier(&db, &parsed).unwrap().unwrap();
        let second = get_or_create_supplier(&db, &parsed).unwrap().unwrap();
        assert_eq!(first, second);

        // Same INN under a differently-spelled name still resolves.
        let respelled = ParsedInvoice {
            supplier_name: Some("ООО \"СМ-Групп\"".to_string()),
            supplier_inn: Some("7801514385".to_string()),
            ..Default::default()
        };
        let third = get_or_create_supplier(&db, &respelled).unwrap().unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn supplier_found_by_name_when_inn_missing() {
        let db = db_handle();
        let with_inn = ParsedInvoice {
            supplier_name: Some("ООО \"СМ Групп\"".to_string()),
            supplier_inn: Some("7801514385".to_string()),
            ..Default::default()
        };
        let created = get_or_create_supplier(&db, &with_inn).unwrap().unwrap();

        let name_only = ParsedInvoice {
            supplier_name: Some("ООО \"СМ Групп\"".to_string()),
            ..Default::default()
        };
        let found = get_or_create_supplier(&db, &name_only).unwrap().unwrap();
        assert_eq!(created, found);
    }

    #[test]
    fn anonymous_invoice_gets_no_supplier() {
        let db = db_handle();
        assert_eq!(
            get_or_create_supplier(&db, &ParsedInvoice::default()).unwrap(),
            None
        );
    }
}
