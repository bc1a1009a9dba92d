use serde::Deserialize;

/// Where uploaded file contents live.
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the filesystem blob store.
    #[serde(default = "default_root")]
    pub root: String,
    /// Write, read back and delete a probe file at startup.
    #[serde(default = "default_validate")]
    pub validate_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            validate_on_start: default_validate(),
        }
    }
}

fn default_root() -> String {
    "media".to_owned()
}

fn default_validate() -> bool {
    true
}
