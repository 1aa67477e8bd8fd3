use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A ref-pinned reference to the external application repository. Identifies
/// exactly one snapshot of application code plus its dependency manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    pub url: String,
    pub git_ref: String,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.url, self.git_ref)
    }
}

/// A fetched, read-only snapshot of the application tree. Version-control
/// metadata has already been stripped; the fingerprint is a content digest of
/// the tree, stable across fetches of the same ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub root: PathBuf,
    pub source: SourceRef,
    pub fingerprint: String,
}
