//! Fuzz target for configuration loading.
//!
//! Arbitrary JSON must be either rejected with a configuration error or
//! produce a configuration whose invariants hold.

#![no_main]

use libfuzzer_sys::fuzz_target;

use hostaudit::config::AuditConfig;
use std::collections::HashSet;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if text.len() > 100_000 {
        return;
    }

    let Ok(config) = AuditConfig::from_json("./fuzz.json", text) else {
        return;
    };

    assert!(!config.audits.is_empty());
    assert!(!config.system.name.is_empty());
    let mut seen = HashSet::new();
    for audit in &config.audits {
        assert!(!audit.name.is_empty());
        assert!(!audit.command.is_empty());
        assert!(seen.insert(audit.name.to_lowercase()), "duplicate {}", audit.name);
    }
});
