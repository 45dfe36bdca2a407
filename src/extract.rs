//! Text extraction for ingested parish documents.
//!
//! Markdown and plain text pass through untouched; PDF bulletins and
//! guides go through `pdf_extract`. Extraction never panics: a broken
//! file yields an error and the pipeline skips the item.

pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PLAIN: &str = "text/plain";
pub const MIME_PDF: &str = "application/pdf";

#[derive(Debug)]
pub enum ExtractError {
    UnsupportedContentType(String),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedContentType(ct) => {
                write!(f, "unsupported content-type: {}", ct)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Content type for a file extension (lowercased, without the dot).
pub fn content_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "md" | "markdown" => Some(MIME_MARKDOWN),
        "txt" => Some(MIME_PLAIN),
        "pdf" => Some(MIME_PDF),
        _ => None,
    }
}

/// Extract plain UTF-8 text from raw file bytes.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    match content_type {
        MIME_MARKDOWN | MIME_PLAIN => Ok(String::from_utf8_lossy(bytes).into_owned()),
        MIME_PDF => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
        }
        other => Err(ExtractError::UnsupportedContentType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping() {
        assert_eq!(content_type_for_extension("md"), Some(MIME_MARKDOWN));
        assert_eq!(content_type_for_extension("pdf"), Some(MIME_PDF));
        assert_eq!(content_type_for_extension("docx"), None);
    }

    #[test]
    fn markdown_passes_through() {
        let text = extract_text("## Misas\n\n10:00".as_bytes(), MIME_MARKDOWN).unwrap();
        assert!(text.contains("## Misas"));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }
}
