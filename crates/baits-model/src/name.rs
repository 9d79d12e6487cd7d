//! Kubernetes-safe name tokens.
//!
//! Artifact names, namespaces and environments are normalized into lowercase
//! DNS-safe tokens. Normalization is idempotent: feeding a normalized token
//! back through [`K8sName::parse`] returns it unchanged.

use std::fmt;
use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

fn disallowed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s-]").expect("static pattern"))
}

fn separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\s_-]+").expect("static pattern"))
}

/// A normalized Kubernetes name token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct K8sName(String);

impl K8sName {
    /// Normalize a raw name.
    ///
    /// Lowercases and trims the input, drops anything that is not a word
    /// character, whitespace or `-`, collapses runs of whitespace, `_` and `-`
    /// into a single `-` and strips leading/trailing dashes.
    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        let lowered = raw.to_lowercase();
        let cleaned = disallowed().replace_all(lowered.trim(), "");
        let dashed = separators().replace_all(&cleaned, "-");
        let token = dashed.trim_matches('-');
        if token.is_empty() {
            return Err(ModelError::InvalidName(raw.to_string()));
        }
        Ok(Self(token.to_string()))
    }

    /// Join an already-normalized token and a name with `-`. Both sides are
    /// non-empty normalized tokens, so the result is normalized too.
    pub(crate) fn joined(prefix: &str, name: &K8sName) -> Self {
        Self(format!("{prefix}-{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The name with dashes replaced by underscores, as used for SQL schema
    /// and environment variable stems.
    pub fn snake(&self) -> String {
        self.0.replace('-', "_")
    }
}

impl fmt::Display for K8sName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for K8sName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for K8sName {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<K8sName> for String {
    fn from(name: K8sName) -> Self {
        name.0
    }
}
