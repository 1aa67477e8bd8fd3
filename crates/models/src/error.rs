use thiserror::Error;

/// Build-phase failures. Every variant is build-fatal: the pipeline stops at
/// the first error and no staging area is promoted past it.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Git ref not found: {git_ref}")]
    RefNotFound { git_ref: String },

    #[error("Source fetch failed: {reason}")]
    FetchFailed { reason: String },

    #[error("Dependency manifest error: {reason}")]
    ManifestError { reason: String },

    #[error("Dependency install failed: {reason}")]
    InstallFailed { reason: String },

    #[error("Helper build failed: {reason}")]
    HelperBuildFailed { reason: String },

    #[error("Missing artifact from stage: {stage}")]
    MissingArtifact { stage: String },

    #[error("Stage did not reach completion: {stage}")]
    StageIncomplete { stage: String },

    #[error("Image assembly failed: {reason}")]
    AssemblyFailed { reason: String },

    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run-phase failures of the bootstrap supervisor itself. A child process
/// exiting is not an error here: that is a state transition handled by the
/// restart policy.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Failed to spawn child process: {reason}")]
    SpawnFailed { reason: String },

    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
