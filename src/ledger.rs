//! Version Ledger
//!
//! Projects registry rows into identity → highest applied version. Built fresh
//! from a registry read on every run and never cached.

use std::collections::BTreeMap;

use baits_model::{BaitVersion, ModelError, KEY_SEPARATOR};
use tracing::debug;

use crate::registry::{RegistryRows, SENTINEL_KEY};

/// A registry row that cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("registry key '{key}' has {separators} '_' separators, expected exactly one")]
    MalformedKey { key: String, separators: usize },

    #[error("registry key '{key}' has an unparsable version: {source}")]
    InvalidVersion {
        key: String,
        #[source]
        source: ModelError,
    },
}

/// Identity → highest recorded version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionLedger {
    entries: BTreeMap<String, BaitVersion>,
}

impl VersionLedger {
    pub fn get(&self, identity: &str) -> Option<&BaitVersion> {
        self.entries.get(identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BaitVersion)> {
        self.entries.iter()
    }

    /// Record `version` unless a higher one is already present.
    fn observe(&mut self, identity: &str, version: BaitVersion) {
        match self.entries.get_mut(identity) {
            Some(current) if *current >= version => {}
            Some(current) => *current = version,
            None => {
                self.entries.insert(identity.to_string(), version);
            }
        }
    }
}

/// Split a versioned key into (identity, version string).
pub fn split_key(key: &str) -> Result<(&str, &str), LedgerError> {
    let separators = key.matches(KEY_SEPARATOR).count();
    match key.split_once(KEY_SEPARATOR) {
        Some((identity, version)) if separators == 1 => Ok((identity, version)),
        _ => Err(LedgerError::MalformedKey {
            key: key.to_string(),
            separators,
        }),
    }
}

/// Build the ledger from raw registry rows.
///
/// Any malformed row fails the whole build: an unreadable ledger is unsafe to
/// reconcile against.
pub fn build_ledger(rows: &RegistryRows) -> Result<VersionLedger, LedgerError> {
    let mut ledger = VersionLedger::default();

    for (key, applied_at) in rows {
        if key == SENTINEL_KEY {
            continue;
        }
        let (identity, raw_version) = split_key(key)?;
        let version = BaitVersion::parse(raw_version).map_err(|source| LedgerError::InvalidVersion {
            key: key.clone(),
            source,
        })?;
        debug!(%identity, %version, %applied_at, "Previously deployed");
        ledger.observe(identity, version);
    }

    Ok(ledger)
}
