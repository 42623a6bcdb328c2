use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::buffer::{MemoryBuffer, TextBuffer};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("cannot read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("the document has not been saved to a file yet")]
    NoPath,
}

fn read(path: &Path) -> Result<String, DocumentError> {
    std::fs::read_to_string(path).map_err(|source| DocumentError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// The sample XML the stylesheet is applied to.
#[derive(Clone)]
pub struct SourceDocument {
    buffer: Arc<dyn TextBuffer>,
}

impl SourceDocument {
    pub fn new(buffer: Arc<dyn TextBuffer>) -> Self {
        Self { buffer }
    }

    /// Replace the buffer's text with the contents of a file.
    pub fn load(&self, path: &Path) -> Result<(), DocumentError> {
        self.buffer.set_text(&read(path)?);
        Ok(())
    }

    pub fn text(&self) -> String {
        self.buffer.text()
    }

    pub fn buffer(&self) -> &Arc<dyn TextBuffer> {
        &self.buffer
    }
}

/// The stylesheet being edited, and the file it belongs to.
#[derive(Clone)]
pub struct StylesheetDocument {
    buffer: Arc<dyn TextBuffer>,
    file_path: Option<PathBuf>,
    /// The text as of the last load or save.
    saved: String,
    is_new: bool,
}

impl StylesheetDocument {
    /// An empty, unsaved stylesheet in a buffer of its own.
    pub fn new() -> Self {
        Self::new_in(Arc::new(MemoryBuffer::default()))
    }

    /// Read a stylesheet into a buffer of its own.
    pub fn open(path: &Path) -> Result<Self, DocumentError> {
        Self::open_in(Arc::new(MemoryBuffer::default()), path)
    }

    /// Start an empty, unsaved stylesheet in `buffer`.
    pub fn new_in(buffer: Arc<dyn TextBuffer>) -> Self {
        buffer.set_text("");
        Self {
            buffer,
            file_path: None,
            saved: String::new(),
            is_new: true,
        }
    }

    /// Read a stylesheet into `buffer`. The buffer is left alone if the file
    /// can't be read.
    pub fn open_in(buffer: Arc<dyn TextBuffer>, path: &Path) -> Result<Self, DocumentError> {
        let text = read(path)?;
        buffer.set_text(&text);
        Ok(Self {
            buffer,
            file_path: Some(path.to_path_buf()),
            saved: text,
            is_new: false,
        })
    }

    pub fn save(&mut self) -> Result<(), DocumentError> {
        let path = self.file_path.clone().ok_or(DocumentError::NoPath)?;
        self.write(&path)
    }

    pub fn save_as(&mut self, path: &Path) -> Result<(), DocumentError> {
        self.write(path)?;
        self.file_path = Some(path.to_path_buf());
        Ok(())
    }

    fn write(&mut self, path: &Path) -> Result<(), DocumentError> {
        let text = self.buffer.text();
        std::fs::write(path, &text).map_err(|source| DocumentError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        self.saved = text;
        self.is_new = false;
        Ok(())
    }

    pub fn text(&self) -> String {
        self.buffer.text()
    }

    pub fn buffer(&self) -> &Arc<dyn TextBuffer> {
        &self.buffer
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_modified(&self) -> bool {
        self.buffer.text() != self.saved
    }

    /// `"Unsaved document"` or the file name, marked with `" *"` when there
    /// are unsaved changes.
    pub fn display_name(&self) -> String {
        let mut name = match &self.file_path {
            Some(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            None => "Unsaved document".to_string(),
        };
        if self.is_modified() {
            name.push_str(" *");
        }
        name
    }
}

impl Default for StylesheetDocument {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document() {
        let document = StylesheetDocument::new();
        assert!(document.is_new());
        assert!(!document.is_modified());
        assert_eq!(document.display_name(), "Unsaved document");
        document.buffer().set_text("<x/>");
        assert_eq!(document.display_name(), "Unsaved document *");
    }

    #[test]
    fn test_save_without_path() {
        let mut document = StylesheetDocument::new();
        assert!(matches!(document.save(), Err(DocumentError::NoPath)));
    }

    #[test]
    fn test_save_as_then_modify() {
        let dir = std::env::temp_dir().join(format!("xsltpad-document-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("style.xslt");

        let mut document = StylesheetDocument::new();
        document.buffer().set_text("<a/>");
        document.save_as(&path).unwrap();
        assert!(!document.is_new());
        assert!(!document.is_modified());
        assert_eq!(document.display_name(), "style.xslt");
        assert_eq!(document.file_path(), Some(path.as_path()));

        document.buffer().set_text("<b/>");
        assert_eq!(document.display_name(), "style.xslt *");
        document.save().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "<b/>");

        let reopened = StylesheetDocument::open(&path).unwrap();
        assert_eq!(reopened.text(), "<b/>");
        assert!(!reopened.is_modified());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_open_missing_file() {
        let error = StylesheetDocument::open(Path::new("/nonexistent/style.xslt")).err();
        assert!(matches!(error, Some(DocumentError::Read { .. })));
    }
}
