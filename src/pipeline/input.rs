//! Input handling: validate PDF bytes, estimate page count, load files.
//!
//! Validation only checks what is cheap and certain: the byte stream is not
//! empty and carries a `%PDF-` header near the start. Whether the document is
//! actually readable is the backend's call.

use crate::error::OcrError;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Acrobat accepts the header anywhere in the first 1024 bytes.
const HEADER_WINDOW: usize = 1024;
const PDF_MAGIC: &[u8] = b"%PDF-";

/// One named document ready for recognition.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    /// File stem for loaded files; used as the output folder name.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl DocumentInput {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Reject byte streams that are empty or have no PDF header.
pub fn validate_pdf(bytes: &[u8]) -> Result<(), OcrError> {
    if bytes.is_empty() {
        return Err(OcrError::InvalidInput {
            reason: "document is empty".into(),
        });
    }
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    if !window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        let shown = &bytes[..bytes.len().min(4)];
        return Err(OcrError::InvalidInput {
            reason: format!(
                "missing %PDF- header (file starts with {:?})",
                String::from_utf8_lossy(shown)
            ),
        });
    }
    Ok(())
}

// `/Type /Page` but not `/Type /Pages`. Compressed object streams hide page
// objects, so zero matches means "unknown" rather than "empty".
static RE_PAGE_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?-u)/Type\s*/Page(?:[^s]|$)").unwrap());

/// Cheap page-count estimate by counting page objects in the raw bytes.
pub fn estimate_page_count(bytes: &[u8]) -> Option<usize> {
    let count = RE_PAGE_OBJECT.find_iter(bytes).count();
    (count > 0).then_some(count)
}

/// Read a PDF from disk, mapping missing files and permission problems to
/// their dedicated errors.
pub async fn read_pdf_file(path: &Path) -> Result<Vec<u8>, OcrError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(OcrError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(OcrError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(OcrError::InvalidInput {
            reason: format!("cannot read '{}': {e}", path.display()),
        }),
    }
}

/// Load one PDF file as a named document.
pub async fn load_file(path: &Path) -> Result<DocumentInput, OcrError> {
    let bytes = read_pdf_file(path).await?;
    Ok(DocumentInput::new(document_name(path), bytes))
}

/// Collect every `*.pdf` file directly inside `dir`, sorted by file name.
///
/// Unreadable entries are skipped with a warning so one bad file does not
/// hide the rest of the folder.
pub async fn load_folder(dir: &Path) -> Result<Vec<DocumentInput>, OcrError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => OcrError::FileNotFound {
            path: dir.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => OcrError::PermissionDenied {
            path: dir.to_path_buf(),
        },
        _ => OcrError::InvalidInput {
            reason: format!("cannot list '{}': {e}", dir.display()),
        },
    })?;

    let mut paths: Vec<PathBuf> = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if is_pdf_path(&path) && path.is_file() {
                    paths.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
            }
        }
    }
    paths.sort();

    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        match load_file(&path).await {
            Ok(doc) => docs.push(doc),
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }
    debug!("Loaded {} PDF(s) from {}", docs.len(), dir.display());
    Ok(docs)
}

/// Resolve a mix of file and folder paths into documents.
pub async fn load_inputs(paths: &[PathBuf]) -> Result<Vec<DocumentInput>, OcrError> {
    let mut docs = Vec::new();
    for path in paths {
        if path.is_dir() {
            docs.extend(load_folder(path).await?);
        } else {
            docs.push(load_file(path).await?);
        }
    }
    Ok(docs)
}

fn is_pdf_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

fn document_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_pdf() {
        assert!(validate_pdf(b"%PDF-1.7\n...").is_ok());
        // Leading garbage before the header is tolerated.
        assert!(validate_pdf(b"\xef\xbb\xbf%PDF-1.4\n").is_ok());
        assert!(matches!(
            validate_pdf(b""),
            Err(OcrError::InvalidInput { .. })
        ));
        assert!(matches!(
            validate_pdf(b"PK\x03\x04 zip archive"),
            Err(OcrError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_header_beyond_window_is_rejected() {
        let mut bytes = vec![b' '; HEADER_WINDOW];
        bytes.extend_from_slice(b"%PDF-1.7");
        assert!(validate_pdf(&bytes).is_err());
    }

    #[test]
    fn test_estimate_page_count() {
        let pdf = b"%PDF-1.4\n1 0 obj << /Type /Pages /Count 2 >>\n\
                    2 0 obj << /Type /Page /Parent 1 0 R >>\n\
                    3 0 obj << /Type/Page/Parent 1 0 R >>\n";
        assert_eq!(estimate_page_count(pdf), Some(2));
        assert_eq!(estimate_page_count(b"%PDF-1.7\n"), None);
    }

    #[test]
    fn test_is_pdf_path() {
        assert!(is_pdf_path(Path::new("a/report.pdf")));
        assert!(is_pdf_path(Path::new("SCAN.PDF")));
        assert!(!is_pdf_path(Path::new("notes.txt")));
        assert!(!is_pdf_path(Path::new("pdf")));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let err = read_pdf_file(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_folder_collects_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF-1.7 b").unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF-1.7 a").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"ignore me").unwrap();

        let docs = load_folder(dir.path()).await.unwrap();
        let names: Vec<&str> = docs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(docs[0].bytes, b"%PDF-1.7 a");
    }
}
