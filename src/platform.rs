//! Host facts: operating system, privilege level, and the Windows registry.
//!
//! The registry query is compiled on every platform so its output parsing
//! can be tested anywhere, but the sandbox only registers it where
//! [`SUPPORTS_SETTINGS`] is true.

use std::fmt;
use std::io;
use std::process::Command;
use tracing::debug;

/// Whether this platform has a registry-like settings store.
pub const SUPPORTS_SETTINGS: bool = cfg!(windows);

/// Name of the running OS, as `std::env::consts::OS` spells it.
#[must_use]
pub fn current_os() -> &'static str {
    std::env::consts::OS
}

/// Whether the process runs with administrative rights.
#[must_use]
pub fn is_privileged() -> bool {
    if cfg!(windows) {
        std::fs::File::open(r"\\.\PHYSICALDRIVE0").is_ok()
    } else {
        Command::new("id")
            .arg("-u")
            .output()
            .is_ok_and(|out| String::from_utf8_lossy(&out.stdout).trim() == "0")
    }
}

/// The host does not match the declared system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanityError {
    OsMismatch { actual: String, expected: String },
    RunningAsRoot,
    NotRoot,
}

impl fmt::Display for SanityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OsMismatch { actual, expected } => {
                write!(f, "OS is: {actual}, expected: {expected}")
            }
            Self::RunningAsRoot => write!(f, "you are running the tool as root"),
            Self::NotRoot => write!(f, "you are not root"),
        }
    }
}

impl std::error::Error for SanityError {}

/// Compare host facts with the declared system.
pub fn check_host(
    expected_os: &str,
    expected_root: bool,
    actual_os: &str,
    actual_root: bool,
) -> Result<(), SanityError> {
    if !actual_os.eq_ignore_ascii_case(expected_os) {
        return Err(SanityError::OsMismatch {
            actual: actual_os.to_string(),
            expected: expected_os.to_string(),
        });
    }
    match (actual_root, expected_root) {
        (true, false) => Err(SanityError::RunningAsRoot),
        (false, true) => Err(SanityError::NotRoot),
        _ => Ok(()),
    }
}

/// [`check_host`] against the running process.
pub fn sanity_check(expected_os: &str, expected_root: bool) -> Result<(), SanityError> {
    check_host(expected_os, expected_root, current_os(), is_privileged())
}

// ============================================================================
// Registry
// ============================================================================

/// Top-level registry hive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingScope {
    LocalMachine,
    CurrentUser,
    ClassesRoot,
    Users,
    CurrentConfig,
    PerformanceData,
}

impl SettingScope {
    /// Resolve a scope prefix such as `HKLM:`. Unknown prefixes fall back to
    /// the current user.
    #[must_use]
    pub fn from_prefix(prefix: &str) -> Self {
        let prefix = prefix.trim();
        let prefix = prefix.strip_suffix(':').unwrap_or(prefix);
        match prefix.to_ascii_uppercase().as_str() {
            "HKLM" | "HKEY_LOCAL_MACHINE" => Self::LocalMachine,
            "HKCR" | "HKEY_CLASSES_ROOT" => Self::ClassesRoot,
            "HKU" | "HKEY_USERS" => Self::Users,
            "HKCC" | "HKEY_CURRENT_CONFIG" => Self::CurrentConfig,
            "HKPD" | "HKEY_PERFORMANCE_DATA" => Self::PerformanceData,
            _ => Self::CurrentUser,
        }
    }

    #[must_use]
    pub const fn hive(&self) -> &'static str {
        match self {
            Self::LocalMachine => "HKLM",
            Self::CurrentUser => "HKCU",
            Self::ClassesRoot => "HKCR",
            Self::Users => "HKU",
            Self::CurrentConfig => "HKCC",
            Self::PerformanceData => "HKPD",
        }
    }
}

#[derive(Debug)]
pub enum SettingError {
    ScopeNotFound,
    ValueNotFound(String),
    Spawn(io::Error),
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScopeNotFound => write!(f, "registry not found"),
            Self::ValueNotFound(value) => write!(f, "value not found: {value}"),
            Self::Spawn(err) => write!(f, "could not start reg: {err}"),
        }
    }
}

impl std::error::Error for SettingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for SettingError {
    fn from(err: io::Error) -> Self {
        Self::Spawn(err)
    }
}

/// Split `HKLM:\Software\Foo` into its scope and the path below it.
#[must_use]
pub fn split_full_path(full_path: &str) -> (SettingScope, &str) {
    match full_path.split_once('\\') {
        Some((scope, path)) => (SettingScope::from_prefix(scope), path),
        None => (SettingScope::from_prefix(full_path), ""),
    }
}

/// Extract `value` from `reg query ... /v value` output.
///
/// String types return their text, DWORD and QWORD return the decimal
/// number. Any other type counts as not found.
pub fn parse_reg_output(stdout: &str, value: &str) -> Result<String, SettingError> {
    for line in stdout.lines() {
        let mut fields = line.trim_start().splitn(3, "    ");
        let (Some(name), Some(kind)) = (fields.next(), fields.next()) else {
            continue;
        };
        if !name.eq_ignore_ascii_case(value) {
            continue;
        }
        let data = fields.next().unwrap_or("").trim_end();
        return match kind {
            "REG_SZ" | "REG_EXPAND_SZ" => Ok(data.to_string()),
            "REG_DWORD" | "REG_QWORD" => {
                let digits = data.trim_start_matches("0x").trim_start_matches("0X");
                u64::from_str_radix(digits, 16)
                    .map(|n| n.to_string())
                    .map_err(|_| SettingError::ValueNotFound(value.to_string()))
            }
            _ => Err(SettingError::ValueNotFound(value.to_string())),
        };
    }
    Err(SettingError::ValueNotFound(value.to_string()))
}

/// Read one registry value through `reg query`.
pub fn query_setting(scope: SettingScope, path: &str, value: &str) -> Result<String, SettingError> {
    let key = if path.is_empty() {
        scope.hive().to_string()
    } else {
        format!("{}\\{}", scope.hive(), path.trim_start_matches('\\'))
    };
    debug!(key = %key, value, "querying registry");

    let key_lookup = Command::new("reg").args(["query", &key]).output()?;
    if !key_lookup.status.success() {
        return Err(SettingError::ScopeNotFound);
    }

    let value_lookup = Command::new("reg")
        .args(["query", &key, "/v", value])
        .output()?;
    if !value_lookup.status.success() {
        return Err(SettingError::ValueNotFound(value.to_string()));
    }
    parse_reg_output(&String::from_utf8_lossy(&value_lookup.stdout), value)
}
