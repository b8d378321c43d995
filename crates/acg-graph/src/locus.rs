use serde::{Deserialize, Serialize};

use acg_core::errors::{AcgError, ErrorInfo};

/// A named genomic region with a fixed number of sites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locus {
    name: String,
    site_count: usize,
}

impl Locus {
    /// Creates a locus. The site count must be at least one.
    pub fn new(name: impl Into<String>, site_count: usize) -> Result<Self, AcgError> {
        let name = name.into();
        if site_count == 0 {
            return Err(AcgError::Graph(
                ErrorInfo::new("empty-locus", "a locus needs at least one site")
                    .with_context("locus", &name),
            ));
        }
        Ok(Self { name, site_count })
    }

    /// Locus name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of sites.
    pub fn site_count(&self) -> usize {
        self.site_count
    }

    /// Index of the last site.
    pub fn last_site(&self) -> usize {
        self.site_count - 1
    }
}
