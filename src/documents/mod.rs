//! Upload directory acting as the document store
//!
//! Documents are plain files. Text and Markdown files are read as UTF-8,
//! PDFs go through `pdf-extract`, and everything else is skipped when
//! loading.


use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::{DocsError, Result};

/// A document's storage name and its extracted text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: String,
    pub text: String,
}

impl Document {
    #[inline]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Text,
    Pdf,
    Unsupported,
}

impl DocumentKind {
    fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("txt" | "md") => Self::Text,
            Some("pdf") => Self::Pdf,
            _ => Self::Unsupported,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an upload under its base file name, replacing any file of the same name
    #[inline]
    pub fn save_upload(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let file_name = sanitize_file_name(name)?;

        fs::create_dir_all(&self.root)?;
        let path = self.root.join(file_name);
        fs::write(&path, contents)?;

        info!("Stored upload {} ({} bytes)", path.display(), contents.len());
        Ok(path)
    }

    /// Copy a local file into the store
    #[inline]
    pub fn import_file<P: AsRef<Path>>(&self, source: P) -> Result<PathBuf> {
        let source = source.as_ref();
        let name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                DocsError::Document(format!("Invalid file name: {}", source.display()))
            })?;
        let contents = fs::read(source)?;
        self.save_upload(name, &contents)
    }

    /// Names of every stored file, sorted
    #[inline]
    pub fn list_files(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Extract every supported document, ordered by file name
    #[inline]
    pub fn load_documents(&self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();

        for name in self.list_files()? {
            let path = self.root.join(&name);
            match DocumentKind::from_path(&path) {
                DocumentKind::Text => {
                    let bytes = fs::read(&path)?;
                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    debug!("Loaded {} ({} bytes)", name, bytes.len());
                    documents.push(Document::new(name, text));
                }
                DocumentKind::Pdf => {
                    let bytes = fs::read(&path)?;
                    let text = extract_pdf_text(&name, &bytes);
                    debug!("Extracted {} characters from {}", text.len(), name);
                    documents.push(Document::new(name, text));
                }
                DocumentKind::Unsupported => {
                    debug!("Skipping {}: unsupported file type", name);
                }
            }
        }

        info!(
            "Loaded {} documents from {}",
            documents.len(),
            self.root.display()
        );
        Ok(documents)
    }
}

/// Text of every page, or an empty string when the PDF cannot be read
fn extract_pdf_text(name: &str, bytes: &[u8]) -> String {
    // pdf-extract panics on some malformed fonts instead of returning an error
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes))) {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!("PDF extraction failed for {}: {}", name, e);
            String::new()
        }
        Err(_) => {
            warn!("PDF extraction failed for {}: extractor panicked", name);
            String::new()
        }
    }
}

fn sanitize_file_name(name: &str) -> Result<&str> {
    let base = Path::new(name)
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::trim)
        .unwrap_or_default();

    if base.is_empty() || base == "." || base == ".." {
        return Err(DocsError::Document(format!(
            "Invalid upload file name: {:?}",
            name
        )));
    }

    Ok(base)
}
