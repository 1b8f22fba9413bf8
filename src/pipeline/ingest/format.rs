use std::path::Path;

use super::IngestError;
use crate::models::DocumentPayload;

/// MIME types the extraction model accepts as inline data.
const ACCEPTED_MIME_PREFIXES: &[&str] = &["application/pdf", "text/", "image/"];

/// Catch-all type file pickers send when they do not know better.
const GENERIC_BINARY_MIME: &str = "application/octet-stream";

/// Validate raw upload bytes and wrap them as a `DocumentPayload`.
///
/// MIME resolution order: the declared type, then magic bytes, then the file
/// extension, then a UTF-8 sniff. A declared type that is generic
/// (`application/octet-stream`) or not accepted by the model falls through
/// to the sniffers. Anything unresolved is unsupported.
pub fn prepare_document(
    file_name: &str,
    bytes: &[u8],
    declared_mime: Option<&str>,
    max_bytes: u64,
) -> Result<DocumentPayload, IngestError> {
    check_size(bytes.len() as u64, max_bytes)?;

    let name = sanitize_filename(file_name);
    let extension = extension_of(&name);

    match extension.as_deref() {
        Some("doc") => return Err(IngestError::LegacyDoc(name)),
        // DOCX is a zip container the model cannot read; the host extracts the
        // text and hands it over through `prepare_text_document`.
        Some("docx") => {
            return Err(IngestError::UnsupportedFormat(format!(
                "{name}: extract the text and submit it as plain text"
            )))
        }
        _ => {}
    }

    let declared = declared_mime
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty());

    let mime_type = declared
        .clone()
        .filter(|m| m != GENERIC_BINARY_MIME && is_accepted_mime(m))
        .or_else(|| sniff_magic_bytes(bytes).map(str::to_string))
        .or_else(|| guess_from_extension(&name))
        .or_else(|| is_likely_text(bytes).then(|| "text/plain".to_string()))
        .or(declared)
        .ok_or_else(|| IngestError::UnsupportedFormat(name.clone()))?;

    if !is_accepted_mime(&mime_type) {
        return Err(IngestError::UnsupportedFormat(format!("{name} ({mime_type})")));
    }

    tracing::debug!(
        name = %name,
        mime_type = %mime_type,
        size = bytes.len(),
        "Document prepared for extraction"
    );

    Ok(DocumentPayload::from_bytes_unchecked(&name, bytes, &mime_type))
}

/// Wrap text the host already decoded (e.g. from a DOCX) as a plain-text document.
pub fn prepare_text_document(
    file_name: &str,
    text: &str,
    max_bytes: u64,
) -> Result<DocumentPayload, IngestError> {
    check_size(text.len() as u64, max_bytes)?;
    let name = sanitize_filename(file_name);
    Ok(DocumentPayload::from_bytes_unchecked(&name, text.as_bytes(), "text/plain"))
}

fn check_size(size: u64, max_bytes: u64) -> Result<(), IngestError> {
    if size > max_bytes {
        return Err(IngestError::PayloadTooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: max_bytes / (1024 * 1024),
        });
    }
    Ok(())
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_accepted_mime(mime_type: &str) -> bool {
    ACCEPTED_MIME_PREFIXES
        .iter()
        .any(|prefix| mime_type.starts_with(prefix))
}

/// Identify PDF, PNG and JPEG from their leading bytes.
fn sniff_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0x25, 0x50, 0x44, 0x46, ..] => Some("application/pdf"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        _ => None,
    }
}

fn guess_from_extension(name: &str) -> Option<String> {
    mime_guess::from_path(name)
        .first()
        .map(|m| m.essence_str().to_string())
}

/// Valid UTF-8 and mostly printable.
fn is_likely_text(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    let sample = &bytes[..bytes.len().min(4096)];
    let text = match std::str::from_utf8(sample) {
        Ok(t) => t,
        // The sample may cut a multi-byte character in half.
        Err(e) if e.valid_up_to() > 0 && sample.len() - e.valid_up_to() < 4 => {
            match std::str::from_utf8(&sample[..e.valid_up_to()]) {
                Ok(t) => t,
                Err(_) => return false,
            }
        }
        Err(_) => return false,
    };

    let total = text.chars().count().max(1);
    let printable = text
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .count();
    printable as f64 / total as f64 > 0.80
}

/// Sanitize a filename: strip path components, limit length.
pub fn sanitize_filename(original: &str) -> String {
    let name = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("document");

    let clean: String = name
        .chars()
        .filter(|c| *c != '\0')
        .take(255)
        .collect();

    if clean.trim().is_empty() {
        "document".to_string()
    } else {
        clean
    }
}
