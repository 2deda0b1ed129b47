//! Wildcard matching against entry names.

use std::ffi::OsStr;
use std::path::Path;

use filedeck_core::OpsError;
use globset::{GlobBuilder, GlobMatcher};

/// A case-insensitive glob applied to a single file or directory name.
///
/// `*` matches any run of characters and `?` exactly one. The pattern is
/// never matched against the full path.
#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    matcher: GlobMatcher,
}

impl WildcardPattern {
    /// Compile a pattern.
    pub fn new(pattern: &str) -> Result<Self, OpsError> {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(false)
            .build()
            .map_err(|e| OpsError::invalid(format!("bad search pattern {pattern:?}: {e}")))?;

        Ok(Self {
            source: pattern.to_string(),
            matcher: glob.compile_matcher(),
        })
    }

    /// Check an entry name against the pattern.
    pub fn matches(&self, name: &OsStr) -> bool {
        self.matcher.is_match(Path::new(name))
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}
