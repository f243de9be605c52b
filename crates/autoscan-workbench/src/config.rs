use std::{path::Path, time::Duration};

use autoscan_processing::{
    correspondence::CorrespondenceConfig, filter::FilterConfig, keypoint::KeypointConfig,
    reconstruction::ReconstructionConfig, registration::RegistrationConfig,
};
use serde::{Deserialize, Serialize};

/// Error types for loading and storing the configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("Failed to access configuration file")]
    Io(#[from] std::io::Error),

    /// The content is not a valid configuration.
    #[error("Invalid configuration")]
    Json(#[from] serde_json::Error),
}

/// Persisted workbench settings. Missing fields take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    /// Minimum spacing between frames kept during continuous capture, in milliseconds.
    pub frame_pitch_ms: u64,
    /// Number of captured frames that may wait for the consumer.
    pub capture_queue_capacity: usize,
    /// Delay between an actuator command and its reply, in milliseconds.
    pub actuator_settle_ms: u64,
    /// Filter strategies.
    pub filter: FilterConfig,
    /// Keypoint strategies.
    pub keypoint: KeypointConfig,
    /// Correspondence strategies.
    pub correspondence: CorrespondenceConfig,
    /// Registration strategies.
    pub registration: RegistrationConfig,
    /// Reconstruction strategies.
    pub reconstruction: ReconstructionConfig,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            frame_pitch_ms: 30,
            capture_queue_capacity: 16,
            actuator_settle_ms: 100,
            filter: FilterConfig::default(),
            keypoint: KeypointConfig::default(),
            correspondence: CorrespondenceConfig::default(),
            registration: RegistrationConfig::default(),
            reconstruction: ReconstructionConfig::default(),
        }
    }
}

impl WorkbenchConfig {
    /// The continuous capture pitch.
    pub fn frame_pitch(&self) -> Duration {
        Duration::from_millis(self.frame_pitch_ms)
    }

    /// The actuator settle delay.
    pub fn actuator_settle(&self) -> Duration {
        Duration::from_millis(self.actuator_settle_ms)
    }

    /// Parse a configuration from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration as pretty printed JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Write the configuration to a file.
    pub fn to_json_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscan_processing::{filter::FilterKind, keypoint::KeypointKind};

    #[test]
    fn test_defaults() {
        let config = WorkbenchConfig::default();
        assert_eq!(config.frame_pitch(), Duration::from_millis(30));
        assert_eq!(config.capture_queue_capacity, 16);
        assert_eq!(config.actuator_settle(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_json() -> Result<(), ConfigError> {
        let config = WorkbenchConfig::from_json_str(
            r#"{"frame_pitch_ms": 50, "keypoint": {"active": "Tomasi"}}"#,
        )?;
        assert_eq!(config.frame_pitch_ms, 50);
        assert_eq!(config.keypoint.active, KeypointKind::Tomasi);
        assert_eq!(config.filter, FilterConfig::default());
        Ok(())
    }

    #[test]
    fn test_file_roundtrip() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("workbench.json");

        let mut config = WorkbenchConfig::default();
        config.filter.active = FilterKind::BoundingBox;
        config.filter.voxel_grid.leaf_size = [0.02, 0.02, 0.05];
        config.to_json_file(&path)?;

        assert_eq!(WorkbenchConfig::from_json_file(&path)?, config);
        assert!(matches!(
            WorkbenchConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
        Ok(())
    }
}
