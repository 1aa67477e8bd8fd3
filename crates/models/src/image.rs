use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Variant;

/// File names inside the image output directory.
pub const LAYER_FILE: &str = "layer.tar.gz";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Paths inside the assembled image root. The layer extracts at `/`, so
/// `app/` becomes `/app` at run time.
pub const APP_DIR: &str = "app";
pub const VENV_DIR: &str = "app/venv";
pub const HELPER_DIR: &str = "app/bin";
pub const CACHE_DIR: &str = "app/cache";
pub const LOG_DIR: &str = "var/log/weatherbox";
pub const SUPERVISOR_CONFIG: &str = "etc/weatherbox/supervisor.toml";

/// Container entry point recorded in the image manifest.
pub const ENTRY_POINT: &str = "/usr/local/bin/weatherbox-supervise";

/// Metadata record written next to the layer tarball. Describes exactly what
/// went into the image and how to start it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImageManifest {
    pub build_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub image_name: String,
    pub variant: Variant,
    pub source_url: String,
    pub source_ref: String,
    pub source_fingerprint: String,
    /// SHA-256 of the compressed layer tarball.
    pub layer_digest: String,
    /// Container entry point: the supervisor binary, in the foreground.
    pub entry_point: Vec<String>,
    /// Runtime path of the helper binary, when the variant includes one.
    pub helper_bin: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_roundtrips_through_json() {
        let manifest = ImageManifest {
            build_id: Uuid::new_v4(),
            created_at: Utc::now(),
            image_name: "weatherbox".to_string(),
            variant: Variant::WithHelper,
            source_url: "https://example.com/app.git".to_string(),
            source_ref: "master".to_string(),
            source_fingerprint: "abc123".to_string(),
            layer_digest: "def456".to_string(),
            entry_point: vec!["/usr/local/bin/weatherbox-supervise".to_string()],
            helper_bin: Some("/app/bin/ansi-renderer".to_string()),
        };

        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let parsed: ImageManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, manifest);
    }
}
