//! Writing a [`DocumentModel`] to disk.
//!
//! Layout, one folder per provider and document:
//!
//! ```text
//! <out>/<provider>/<doc>/<doc>.txt
//! <out>/<provider>/<doc>/page1_img1.jpg
//! <out>/<provider>/<doc>/metadata.json
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! crash never leaves a truncated file behind.

use crate::error::OcrError;
use crate::output::DocumentModel;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Files produced by [`write_document`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedDocument {
    pub dir: PathBuf,
    pub text_path: PathBuf,
    pub image_paths: Vec<PathBuf>,
    pub metadata_path: PathBuf,
}

/// Write text, images and metadata for `doc` under `out_dir`.
///
/// `name` is the document name, usually the input file stem.
pub async fn write_document(
    doc: &DocumentModel,
    name: &str,
    out_dir: &Path,
) -> Result<ExportedDocument, OcrError> {
    let name = sanitize(name);
    let dir = out_dir.join(sanitize(&doc.provider_id)).join(&name);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: dir.clone(),
            source: e,
        })?;

    let text_path = dir.join(format!("{name}.txt"));
    write_atomic(&text_path, doc.text.as_bytes()).await?;

    let mut image_paths = Vec::with_capacity(doc.images.len());
    for (image_name, data) in &doc.images {
        let path = dir.join(format!("{}.{}", image_name, image_extension(data)));
        write_atomic(&path, data).await?;
        image_paths.push(path);
    }

    let metadata_path = dir.join("metadata.json");
    let metadata = serde_json::to_vec_pretty(&doc.metadata())
        .map_err(|e| OcrError::Internal(format!("metadata serialisation: {e}")))?;
    write_atomic(&metadata_path, &metadata).await?;

    info!(
        "Wrote {} ({} image(s)) to {}",
        name,
        image_paths.len(),
        dir.display()
    );
    Ok(ExportedDocument {
        dir,
        text_path,
        image_paths,
        metadata_path,
    })
}

/// File extension for an image payload, sniffed from its magic bytes.
pub fn image_extension(data: &[u8]) -> &'static str {
    image::guess_format(data)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), OcrError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| OcrError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

/// Keep a name usable as a single path component.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "document".to_string(),
        trimmed => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecognitionStats;
    use std::collections::BTreeMap;

    fn model() -> DocumentModel {
        let mut images = BTreeMap::new();
        images.insert(
            "page1_img1".to_string(),
            vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0],
        );
        images.insert("page2_img1".to_string(), vec![1, 2, 3]);
        DocumentModel {
            text: "# Title\n\nBody\n".into(),
            images,
            page_count: 2,
            provider_id: "mistral".into(),
            warnings: vec!["page 2: 1 block(s) had out-of-page bounding boxes".into()],
            stats: RecognitionStats::default(),
        }
    }

    #[test]
    fn test_image_extension() {
        assert_eq!(image_extension(b"\x89PNG\r\n\x1a\n...."), "png");
        assert_eq!(image_extension(&[0xff, 0xd8, 0xff, 0xe0]), "jpg");
        assert_eq!(image_extension(b"nope"), "bin");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("report"), "report");
        assert_eq!(sanitize("a/b\\c"), "a_b_c");
        assert_eq!(sanitize(".."), "document");
    }

    #[tokio::test]
    async fn test_write_document_layout() {
        let out = tempfile::tempdir().unwrap();
        let written = write_document(&model(), "report", out.path()).await.unwrap();

        assert_eq!(written.dir, out.path().join("mistral").join("report"));
        let text = std::fs::read_to_string(&written.text_path).unwrap();
        assert_eq!(text, "# Title\n\nBody\n");

        let names: Vec<String> = written
            .image_paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["page1_img1.png", "page2_img1.bin"]);

        let meta: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&written.metadata_path).unwrap()).unwrap();
        assert_eq!(meta["provider_id"], "mistral");
        assert_eq!(meta["page_count"], 2);
        assert_eq!(meta["image_names"][1], "page2_img1");
        assert_eq!(meta["warnings"].as_array().unwrap().len(), 1);

        // No temporary files left behind.
        let leftovers = std::fs::read_dir(&written.dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
