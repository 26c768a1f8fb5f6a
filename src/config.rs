//! Settings loaded from `config.toml`.
//!
//! ```toml
//! units = "millimeters"
//!
//! [render]
//! scaleMultiplier = 1.0
//! drawGrid = true
//! enableWrap = false
//!
//! [sync]
//! debounce_ms = 500
//! poll_interval_ms = 1000
//! extend_ranges = false
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::sync::SyncDecision;
use crate::types::{RenderOptions, UnitSystem};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
    /// Grow ranges to the used range when a change is accepted.
    pub extend_ranges: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 500,
            poll_interval_ms: 1000,
            extend_ranges: false,
        }
    }
}

impl SyncSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// The answer given to change prompts when nobody is asked.
    pub fn default_decision(&self) -> SyncDecision {
        if self.extend_ranges {
            SyncDecision::UpdateAndExtend
        } else {
            SyncDecision::Update
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Unit system for newly created documents.
    pub units: UnitSystem,
    /// Render options used by `insert` unless overridden on the command line.
    pub render: RenderOptions,
    pub sync: SyncSettings,
}

impl Settings {
    /// `<config dir>/tablelink/config.toml`
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tablelink")
            .join("config.toml")
    }

    /// Load from `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn load_default() -> Result<Self> {
        Self::load(&Self::config_path())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::error::TableLinkError;
    use crate::types::HorizontalOverride;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.sync.debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
units = "inches"

[render]
scaleMultiplier = 2.0
horizontalOverride = "center"
enableWrap = true

[sync]
extend_ranges = true
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.units, UnitSystem::Inches);
        assert_eq!(settings.render.scale_multiplier, 2.0);
        assert_eq!(settings.render.horizontal_override, HorizontalOverride::Center);
        assert!(settings.render.enable_wrap);
        assert!(settings.render.draw_grid);
        assert_eq!(settings.sync.poll_interval_ms, 1000);
        assert_eq!(settings.sync.default_decision(), SyncDecision::UpdateAndExtend);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "units = [").unwrap();
        assert!(matches!(
            Settings::load(&path),
            Err(TableLinkError::Config(_))
        ));
    }
}
