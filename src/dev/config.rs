use std::time::Duration;

use crate::gap::Uuid;

/// Device configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Config {
    /// Maximum time to wait for the initial adapter state. Waits forever if
    /// `None`.
    pub startup_timeout: Option<Duration>,
    /// Services that scanned peers must advertise. Empty to report all peers.
    pub scan_services: Vec<Uuid>,
}

#[cfg(feature = "fs")]
mod fs {
    use std::path::Path;
    use std::{fs, io};

    use tracing::{debug, error, warn};

    use super::Config;

    impl Config {
        const FILE_NAME: &'static str = "central.json";

        /// Loads the configuration from a JSON file. The default configuration
        /// is returned if the file does not exist or cannot be parsed.
        #[must_use]
        pub fn load(path: impl AsRef<Path>) -> Self {
            let path = path.as_ref();
            let s = match fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) if matches!(e.kind(), io::ErrorKind::NotFound) => {
                    debug!("No config file: {}", path.display());
                    return Self::default();
                }
                Err(e) => {
                    error!("Failed to read: {} ({e})", path.display());
                    return Self::default();
                }
            };
            match serde_json::from_str(&s) {
                Ok(cfg) => {
                    debug!("Loaded: {}", path.display());
                    cfg
                }
                Err(e) => {
                    error!("Invalid file contents: {} ({e})", path.display());
                    Self::default()
                }
            }
        }

        /// Loads the configuration from the current user's config directory.
        #[must_use]
        pub fn per_user(app: impl AsRef<Path>) -> Self {
            let Some(dir) = dirs::config_dir() else {
                warn!("User config directory not available");
                return Self::default();
            };
            Self::load(dir.join(app.as_ref()).join(Self::FILE_NAME))
        }
    }

}
