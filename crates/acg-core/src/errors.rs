//! Error surface of the sampler crates.
//!
//! Every failure carries an [`ErrorInfo`] with a stable kebab-case code
//! (`"region-unavailable"`, `"invalid-state"`, ...) that tests and callers
//! match on, plus free-form context such as node ids, heights or site ranges.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Code, message and context of one failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable code.
    pub code: String,
    /// Diagnostic message.
    pub message: String,
    /// Named values describing where the failure happened.
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Suggested remedy, when one is obvious.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Payload with no context.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Records a named value; a later value under the same key wins.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Attaches a remedy.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        let mut entries = self.context.iter();
        if let Some((key, value)) = entries.next() {
            write!(f, " | context: [{key}={value}")?;
            for (key, value) in entries {
                write!(f, ", {key}={value}")?;
            }
            write!(f, "]")?;
        }
        match &self.hint {
            Some(hint) => write!(f, " | hint: {hint}"),
            None => Ok(()),
        }
    }
}

/// Failure of a sampler operation, grouped by the layer that raised it.
///
/// A rejected proposal is not an error: operators report it as a `-inf` log
/// Hastings ratio. `AcgError` means malformed input or a broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum AcgError {
    /// Malformed clonal frame, conversion, locus or site interval.
    #[error("graph error: {0}")]
    Graph(ErrorInfo),
    /// Invalid parameters, population functions or failed sampling draws.
    #[error("model error: {0}")]
    Model(ErrorInfo),
    /// A move left the graph violating its invariants.
    #[error("operator error: {0}")]
    Operator(ErrorInfo),
    /// Unusable run configuration.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Record, checkpoint or Newick encoding failures.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl AcgError {
    /// Payload of the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            AcgError::Graph(info)
            | AcgError::Model(info)
            | AcgError::Operator(info)
            | AcgError::Config(info)
            | AcgError::Serde(info) => info,
        }
    }

    /// Machine readable code of the payload.
    pub fn code(&self) -> &str {
        &self.info().code
    }

    /// Adds context to an error raised further down, such as the chain step
    /// at which an operator failed.
    pub fn with_context(self, key: impl Into<String>, value: impl ToString) -> Self {
        match self {
            AcgError::Graph(info) => AcgError::Graph(info.with_context(key, value)),
            AcgError::Model(info) => AcgError::Model(info.with_context(key, value)),
            AcgError::Operator(info) => AcgError::Operator(info.with_context(key, value)),
            AcgError::Config(info) => AcgError::Config(info.with_context(key, value)),
            AcgError::Serde(info) => AcgError::Serde(info.with_context(key, value)),
        }
    }
}
