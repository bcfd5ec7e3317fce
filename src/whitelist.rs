//! Registry of command names that audits may execute.
//!
//! Names are canonicalized before they are stored or looked up: internal
//! spaces are removed and the result is lowercased. Lookups are therefore
//! case-insensitive (`Get-Service` and `get-service` are the same entry).
//!
//! The registry starts from [`BUILTIN_COMMANDS`] and is extended once at
//! startup with operator supplied names (`--add`). There is no removal.

use std::collections::HashSet;
use std::fmt;

/// Built-in diagnostic and query commands permitted on every host.
pub const BUILTIN_COMMANDS: &[&str] = &[
    // Windows / PowerShell
    "Get-MpComputerStatus",
    "Get-ItemPropertyValue",
    "Get-ItemProperty",
    "Get-NetFirewallProfile",
    "Get-Service",
    "Get-LocalUser",
    "Get-Process",
    "Get-HotFix",
    "Test-Path",
    "Select-String",
    "%",
    "type",
    "reg",
    "findstr",
    "dir",
    "sc",
    "netsh",
    "auditpol",
    "whoami",
    // Filesystem
    "echo",
    "ls",
    "cat",
    "head",
    "tail",
    "stat",
    "find",
    "test",
    "wc",
    "sort",
    "uniq",
    "cut",
    "tr",
    "df",
    "mount",
    // Text processing
    "grep",
    "egrep",
    "awk",
    "sed",
    "xargs",
    // Processes and users
    "ps",
    "id",
    "uname",
    "hostname",
    "crontab",
    "useradd",
    "getent",
    // Services and logs
    "systemctl",
    "journalctl",
    "timedatectl",
    "sshd",
    // Kernel and security modules
    "modprobe",
    "lsmod",
    "rmmod",
    "sysctl",
    "apparmor_status",
    "sestatus",
    "auditctl",
    "authselect",
    // Packages
    "rpm",
    "dnf",
    "zypper",
    "dpkg",
    "subscription-manager",
    // Network
    "ss",
    "netstat",
    "lsof",
    "iw",
    "ip",
    "nmcli",
    "firewall-cmd",
    "iptables",
    "ip6tables",
    "nft",
];

/// Canonical form of a command name: spaces removed, lowercased.
///
/// Returns `None` when nothing is left.
#[must_use]
pub fn canonicalize(name: &str) -> Option<String> {
    let stripped: String = name.chars().filter(|c| *c != ' ').collect();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_lowercase())
    }
}

/// Case-insensitive set of permitted command names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whitelist {
    names: HashSet<String>,
}

impl Whitelist {
    /// An empty registry. Mostly useful in tests.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            names: HashSet::new(),
        }
    }

    /// A registry seeded with [`BUILTIN_COMMANDS`].
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut whitelist = Self::empty();
        whitelist.register(BUILTIN_COMMANDS.iter().copied());
        whitelist
    }

    /// Merge names into the registry.
    ///
    /// Blank entries are dropped and duplicates collapse. Returns how many
    /// names were actually new.
    pub fn register<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let before = self.names.len();
        for name in names {
            if let Some(canonical) = canonicalize(name.as_ref()) {
                self.names.insert(canonical);
            }
        }
        self.names.len() - before
    }

    /// Whether `name` may be executed.
    #[must_use]
    pub fn is_allowed(&self, name: &str) -> bool {
        canonicalize(name).is_some_and(|canonical| self.names.contains(&canonical))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Display for Whitelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sorted_names().join(", "))
    }
}

/// Split a comma separated `--add` value into names.
#[must_use]
pub fn parse_additions(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(canonicalize)
        .collect()
}
