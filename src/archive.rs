//! ZIP packaging of the output directory.
//!
//! After a run, everything under the output directory (logs, artifacts and
//! `result.json`) is packed into one archive. By default it is named after
//! the local time, `DD.MM.YY_HH-MM-SS.zip`, and placed next to the output
//! directory. An existing archive is never overwritten.

use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip_next::write::SimpleFileOptions;
use zip_next::{CompressionMethod, ZipWriter};

/// `chrono` format of the default archive name.
pub const ARCHIVE_NAME_FORMAT: &str = "%d.%m.%y_%H-%M-%S.zip";

const ZIP_EXTENSION: &str = "zip";

/// Entry prefix used when the output directory has no name of its own.
const FALLBACK_ROOT: &str = "output";

#[derive(Debug)]
pub enum ArchiveError {
    Exists { path: PathBuf },
    IsDirectory { path: PathBuf },
    Io { path: PathBuf, source: io::Error },
    Zip(zip_next::result::ZipError),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists { path } => write!(f, "archive {} already exists", path.display()),
            Self::IsDirectory { path } => {
                write!(f, "archive path {} is a directory", path.display())
            }
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Zip(err) => write!(f, "cannot write archive: {err}"),
        }
    }
}

impl std::error::Error for ArchiveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Zip(err) => Some(err),
            Self::Exists { .. } | Self::IsDirectory { .. } => None,
        }
    }
}

impl From<zip_next::result::ZipError> for ArchiveError {
    fn from(err: zip_next::result::ZipError) -> Self {
        Self::Zip(err)
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Archive name for a run finishing at `now`.
#[must_use]
pub fn default_name(now: DateTime<Local>) -> String {
    now.format(ARCHIVE_NAME_FORMAT).to_string()
}

/// Where the archive for `output_dir` goes.
///
/// A requested name gets `.zip` appended when it lacks the extension and is
/// used as given. Without one the timestamped default lands beside
/// `output_dir`.
#[must_use]
pub fn resolve_path(requested: Option<&str>, output_dir: &Path, now: DateTime<Local>) -> PathBuf {
    match requested.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => {
            let path = PathBuf::from(name);
            let has_extension = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(ZIP_EXTENSION));
            if has_extension {
                path
            } else {
                PathBuf::from(format!("{name}.{ZIP_EXTENSION}"))
            }
        }
        None => output_dir
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(default_name(now)),
    }
}

/// Refuse a target that is a directory or already exists.
pub fn check_target(path: &Path) -> Result<(), ArchiveError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Err(ArchiveError::IsDirectory {
            path: path.to_path_buf(),
        }),
        Ok(_) => Err(ArchiveError::Exists {
            path: path.to_path_buf(),
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_error(path)(err)),
    }
}

/// Every regular file below `dir`, sorted, as (path on disk, entry name).
fn collect(dir: &Path, prefix: &str, files: &mut Vec<(PathBuf, String)>) -> Result<(), ArchiveError> {
    let mut entries = fs::read_dir(dir)
        .map_err(io_error(dir))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_error(dir))?;
    entries.sort_by_key(fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let name = format!("{prefix}/{}", entry.file_name().to_string_lossy());
        let kind = entry.file_type().map_err(io_error(&path))?;
        if kind.is_dir() {
            collect(&path, &name, files)?;
        } else if kind.is_file() {
            files.push((path, name));
        }
    }
    Ok(())
}

/// Pack every file under `output_dir` into a new archive at `target`.
/// Returns the number of files packed.
pub fn package(output_dir: &Path, target: &Path) -> Result<usize, ArchiveError> {
    check_target(target)?;

    let root = output_dir
        .file_name()
        .map_or_else(|| FALLBACK_ROOT.to_string(), |name| name.to_string_lossy().into_owned());
    let mut files = Vec::new();
    collect(output_dir, &root, &mut files)?;

    let file = File::create(target).map_err(io_error(target))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (path, name) in &files {
        let content = fs::read(path).map_err(io_error(path))?;
        zip.start_file(name.as_str(), options)?;
        zip.write_all(&content).map_err(io_error(target))?;
        debug!(entry = %name, bytes = content.len(), "archived");
    }
    zip.finish()?;

    info!(archive = %target.display(), files = files.len(), "Zip folder: {} created", target.display());
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Read;
    use tempfile::TempDir;

    fn at_noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 7, 12, 4, 5).single().unwrap()
    }

    #[test]
    fn default_name_is_day_first_timestamp() {
        assert_eq!(default_name(at_noon()), "07.03.26_12-04-05.zip");
    }

    #[test]
    fn default_archive_sits_beside_output_dir() {
        let path = resolve_path(None, Path::new("/srv/run/output"), at_noon());
        assert_eq!(path, PathBuf::from("/srv/run/07.03.26_12-04-05.zip"));

        let relative = resolve_path(Some("  "), Path::new("output"), at_noon());
        assert_eq!(relative, PathBuf::from("07.03.26_12-04-05.zip"));
    }

    #[test]
    fn requested_name_gets_zip_extension() {
        let out = Path::new("output");
        assert_eq!(resolve_path(Some("report"), out, at_noon()), PathBuf::from("report.zip"));
        assert_eq!(resolve_path(Some("report.ZIP"), out, at_noon()), PathBuf::from("report.ZIP"));
        assert_eq!(
            resolve_path(Some("host.v2"), out, at_noon()),
            PathBuf::from("host.v2.zip")
        );
    }

    #[test]
    fn existing_targets_are_refused() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            check_target(tmp.path()),
            Err(ArchiveError::IsDirectory { .. })
        ));

        let existing = tmp.path().join("old.zip");
        fs::write(&existing, b"keep me").unwrap();
        assert!(matches!(check_target(&existing), Err(ArchiveError::Exists { .. })));
        assert_eq!(fs::read(&existing).unwrap(), b"keep me");

        assert!(check_target(&tmp.path().join("new.zip")).is_ok());
    }

    #[test]
    fn package_includes_nested_files() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(out.join("artifacts")).unwrap();
        fs::write(out.join("result.json"), "{}").unwrap();
        fs::write(out.join("artifacts/greeting.txt"), [0xff, b'h', b'i']).unwrap();

        let target = tmp.path().join("run.zip");
        assert_eq!(package(&out, &target).unwrap(), 2);

        let mut archive = zip_next::ZipArchive::new(File::open(&target).unwrap()).unwrap();
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, ["out/artifacts/greeting.txt", "out/result.json"]);

        let mut content = Vec::new();
        archive
            .by_name("out/artifacts/greeting.txt")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content, [0xff, b'h', b'i']);
    }

    #[test]
    fn package_refuses_to_overwrite() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let target = tmp.path().join("run.zip");
        fs::write(&target, b"previous").unwrap();

        assert!(matches!(package(&out, &target), Err(ArchiveError::Exists { .. })));
        assert_eq!(fs::read(&target).unwrap(), b"previous");
    }
}
