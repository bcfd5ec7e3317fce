//! On-disk artifact capture.
//!
//! Artifacts live in `<output-dir>/artifacts/`. The directory is removed once
//! at run start and created lazily when the first artifact is written.
//! Content is redacted before it touches disk when the audit declares a
//! redaction pattern.

use regex::Regex;
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the artifact subdirectory inside the output directory.
pub const ARTIFACT_DIR: &str = "artifacts";

/// Replacement for every redaction-pattern match.
pub const REDACTION_TOKEN: &str = "REDACTED";

/// Replace every match of `pattern` in `content` with [`REDACTION_TOKEN`].
#[must_use]
pub fn redact<'a>(content: &'a str, pattern: Option<&Regex>) -> Cow<'a, str> {
    match pattern {
        Some(regex) => {
            debug!(pattern = %regex, "redacting artifact content");
            regex.replace_all(content, REDACTION_TOKEN)
        }
        None => Cow::Borrowed(content),
    }
}

/// Byte-level [`redact`]. Bytes outside a match are written through
/// unchanged, so output in a legacy code page survives.
#[must_use]
pub fn redact_bytes<'a>(content: &'a [u8], pattern: Option<&Regex>) -> Cow<'a, [u8]> {
    let Some(regex) = pattern else {
        return Cow::Borrowed(content);
    };
    match regex::bytes::Regex::new(regex.as_str()) {
        Ok(bytes) => {
            debug!(pattern = %regex, "redacting artifact content");
            bytes.replace_all(content, REDACTION_TOKEN.as_bytes())
        }
        Err(err) => {
            debug!(pattern = %regex, error = %err, "falling back to text redaction");
            let text = String::from_utf8_lossy(content);
            Cow::Owned(redact(&text, pattern).into_owned().into_bytes())
        }
    }
}

/// Last path component, splitting on both `/` and `\`.
#[must_use]
pub fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[derive(Debug)]
pub enum ArtifactError {
    Io { path: PathBuf, source: io::Error },
    NotRegularFile { path: PathBuf },
    EmptyName,
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::NotRegularFile { path } => {
                write!(f, "{} is not a regular file", path.display())
            }
            Self::EmptyName => write!(f, "artifact has no file name"),
        }
    }
}

impl std::error::Error for ArtifactError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArtifactError + '_ {
    move |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes artifacts below one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    #[must_use]
    pub fn new(output_dir: &Path) -> Self {
        Self {
            dir: output_dir.join(ARTIFACT_DIR),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove every artifact from a previous run.
    pub fn clear(&self) -> Result<(), ArtifactError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ArtifactError::Io {
                path: self.dir.clone(),
                source,
            }),
        }
    }

    fn ensure_dir(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))
    }

    /// Write `content` to `<audit name>.txt`.
    pub fn write_text(
        &self,
        audit_name: &str,
        content: &str,
        redaction: Option<&Regex>,
    ) -> Result<PathBuf, ArtifactError> {
        self.write_named(audit_name, redact(content, redaction).as_bytes())
    }

    /// Write raw command output to `<audit name>.txt`, byte for byte apart
    /// from redaction.
    pub fn write_bytes(
        &self,
        audit_name: &str,
        content: &[u8],
        redaction: Option<&Regex>,
    ) -> Result<PathBuf, ArtifactError> {
        self.write_named(audit_name, &redact_bytes(content, redaction))
    }

    fn write_named(&self, audit_name: &str, content: &[u8]) -> Result<PathBuf, ArtifactError> {
        if audit_name.is_empty() {
            return Err(ArtifactError::EmptyName);
        }
        self.ensure_dir()?;
        let path = self.dir.join(format!("{audit_name}.txt"));
        fs::write(&path, content).map_err(io_error(&path))?;
        info!(audit = audit_name, artifact = %path.display(), "artifact saved");
        Ok(path)
    }

    /// Copy the file at `source` into the artifact directory under its base
    /// name.
    pub fn copy_file(
        &self,
        audit_name: &str,
        source: &str,
        redaction: Option<&Regex>,
    ) -> Result<PathBuf, ArtifactError> {
        let source_path = Path::new(source);
        let metadata = fs::metadata(source_path).map_err(io_error(source_path))?;
        if !metadata.is_file() {
            return Err(ArtifactError::NotRegularFile {
                path: source_path.to_path_buf(),
            });
        }

        let name = base_name(source);
        if name.is_empty() {
            return Err(ArtifactError::EmptyName);
        }

        let content = fs::read(source_path).map_err(io_error(source_path))?;
        self.ensure_dir()?;
        let target = self.dir.join(name);
        fs::write(&target, redact_bytes(&content, redaction)).map_err(io_error(&target))?;
        info!(audit = audit_name, artifact = %target.display(), "artifact saved");
        Ok(target)
    }
}
