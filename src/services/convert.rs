//! PDF to PNG conversion for scanned invoices without a text layer.
//!
//! External converters are tried strictly in order; each failure adds a
//! diagnostic note and the next tool gets its turn. No retries and no
//! backoff: one pass through the chain per document.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{tool} не установлен или не запускается: {source}")]
    Launch {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} завершился с ошибкой: {detail}")]
    Failed { tool: &'static str, detail: String },
    #[error("{tool} отработал, но не создал изображение")]
    NoOutput { tool: &'static str },
    #[error("ни один конвертер не справился с файлом:\n{notes}")]
    Exhausted { notes: String },
}

/// One rung of the fallback chain. Writes a PNG of the first page into
/// `output_dir` and returns its bytes.
trait ConvertStrategy {
    fn name(&self) -> &'static str;
    fn attempt(&self, input: &Path, output_dir: &Path) -> Result<Vec<u8>, ConvertError>;
}

struct Pdftoppm;
struct ImageMagick;
struct Ghostscript;

impl ConvertStrategy for Pdftoppm {
    fn name(&self) -> &'static str {
        "pdftoppm"
    }

    fn attempt(&self, input: &Path, output_dir: &Path) -> Result<Vec<u8>, ConvertError> {
        let prefix = output_dir.join("page");
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg("200")
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg("1")
            .arg(input)
            .arg(&prefix)
            .output()
            .map_err(|source| ConvertError::Launch {
                tool: self.name(),
                source,
            })?;
        check_status(self.name(), &output)?;
        // pdftoppm pads the page number depending on page count.
        for candidate in ["page-1.png", "page-01.png", "page-001.png"] {
            let path = output_dir.join(candidate);
            if path.exists() {
                return read_output(self.name(), &path);
            }
        }
        Err(ConvertError::NoOutput { tool: self.name() })
    }
}

impl ConvertStrategy for ImageMagick {
    fn name(&self) -> &'static str {
        "imagemagick"
    }

    fn attempt(&self, input: &Path, output_dir: &Path) -> Result<Vec<u8>, ConvertError> {
        let out = output_dir.join("magick.png");
        let mut source = input.as_os_str().to_os_string();
        source.push("[0]");
        let output = Command::new("magick")
            .arg("-density")
            .arg("200")
            .arg(&source)
            .arg(&out)
            .output()
            .map_err(|source| ConvertError::Launch {
                tool: self.name(),
                source,
            })?;
        check_status(self.name(), &output)?;
        read_output(self.name(), &out)
    }
}

impl ConvertStrategy for Ghostscript {
    fn name(&self) -> &'static str {
        "ghostscript"
    }

    fn attempt(&self, input: &Path, output_dir: &Path) -> Result<Vec<u8>, ConvertError> {
        let out = output_dir.join("gs.png");
        let output = Command::new("gs")
            .arg("-dNOPAUSE")
            .arg("-dBATCH")
            .arg("-sDEVICE=png16m")
            .arg("-r200")
            .arg("-dFirstPage=1")
            .arg("-dLastPage=1")
            .arg(format!("-sOutputFile={}", out.display()))
            .arg(input)
            .output()
            .map_err(|source| ConvertError::Launch {
                tool: self.name(),
                source,
            })?;
        check_status(self.name(), &output)?;
        read_output(self.name(), &out)
    }
}

fn check_status(tool: &'static str, output: &std::process::Output) -> Result<(), ConvertError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ConvertError::Failed {
        tool,
        detail: stderr.trim().chars().take(300).collect(),
    })
}

fn read_output(tool: &'static str, path: &Path) -> Result<Vec<u8>, ConvertError> {
    std::fs::read(path).map_err(|_| ConvertError::NoOutput { tool })
}

fn work_dir() -> std::io::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("stella-convert-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Renders the first PDF page to PNG bytes, falling through the chain of
/// converters. Returns the image together with the notes accumulated on
/// the way, so the caller can log how the document was handled.
pub fn pdf_to_png(input: &Path) -> Result<(Vec<u8>, Vec<String>), ConvertError> {
    let strategies: [&dyn ConvertStrategy; 3] = [&Pdftoppm, &ImageMagick, &Ghostscript];
    let mut notes = Vec::new();

    let dir = work_dir().map_err(|source| ConvertError::Launch {
        tool: "tempdir",
        source,
    })?;

    let result = run_chain(&strategies, input, &dir, &mut notes);
    let _ = std::fs::remove_dir_all(&dir);

    match result {
        Some(bytes) => Ok((bytes, notes)),
        None => Err(ConvertError::Exhausted {
            notes: notes.join("\n"),
        }),
    }
}

fn run_chain(
    strategies: &[&dyn ConvertStrategy],
    input: &Path,
    dir: &Path,
    notes: &mut Vec<String>,
) -> Option<Vec<u8>> {
    for strategy in strategies {
        debug!(tool = strategy.name(), "пробуем конвертер");
        match strategy.attempt(input, dir) {
            Ok(bytes) => {
                notes.push(format!("{}: успех", strategy.name()));
                return Some(bytes);
            }
            Err(err) => {
                warn!(tool = strategy.name(), error = %err, "конвертер не справился");
                notes.push(format!("{}: {}", strategy.name(), err));
            }
        }
    }
    None
}

/// Embedded text layer, when the PDF has one. An empty or whitespace
/// layer counts as absent so scanned documents fall through to OCR.
pub fn pdf_text_layer(path: &Path) -> Option<String> {
    match pdf_extract::extract_text(path) {
        Ok(text) if text.split_whitespace().count() > 10 => Some(text),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_error_carries_all_notes() {
        let err = ConvertError::Exhausted {
            notes: "pdftoppm: не запускается\nimagemagick: не запускается".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("pdftoppm"));
        assert!(text.contains("imagemagick"));
    }

    #[test]
    fn text_layer_requires_real_content() {
        // Not a PDF at all: extraction fails, no text layer reported.
        let path = std::env::temp_dir().join("stella-not-a-pdf.txt");
        std::fs::write(&path, "plain text").unwrap();
        assert!(pdf_text_layer(&path).is_none());
        let _ = std::fs::remove_file(&path);
    }
}
