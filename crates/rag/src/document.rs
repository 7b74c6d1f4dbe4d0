use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// A loaded source document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    /// The file name, used to identify chunks of this document.
    pub source: String,
    /// The extracted plain text.
    pub text: String,
    /// Where the document was read from.
    pub path: PathBuf,
}

impl Document {
    /// Reads a `.txt`, `.md` or `.pdf` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match extension(path).as_deref() {
            Some("txt" | "md") => fs::read_to_string(path)?,
            Some("pdf") => {
                let bytes = fs::read(path)?;
                let text = pdf_extract::extract_text_from_mem(&bytes).map_err(|err| {
                    Error::Pdf {
                        path: path.to_owned(),
                        reason: err.to_string(),
                    }
                })?;
                if text.trim().is_empty() {
                    warn!("no text in {}, it might be a scanned document", path.display());
                }
                text
            }
            _ => return Err(Error::UnsupportedFormat(path.to_owned())),
        };
        debug!("loaded {} ({} bytes of text)", path.display(), text.len());

        Ok(Self {
            source: source_name(path),
            text,
            path: path.to_owned(),
        })
    }
}

/// The name chunks of `path` are filed under.
pub(crate) fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}
