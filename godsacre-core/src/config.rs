//! Configuration management
//!
//! Settings live in `settings.json` in the data directory:
//! ```json
//! {
//!   "import": {
//!     "blankMarkers": ["", "-", "nan", "NaN", "None", "N/A"],
//!     "multiValueSeparator": ",",
//!     "yearThreshold": 50,
//!     "allowWipe": true
//!   }
//! }
//! ```
//! Sections other tools keep in the same file are ignored.

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    import: ImportSettings,
}

/// Import engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSettings {
    /// Cell values treated as empty after trimming
    #[serde(default = "default_blank_markers")]
    pub blank_markers: Vec<String>,
    /// Separator for multi-valued cells
    #[serde(default = "default_separator")]
    pub multi_value_separator: String,
    /// Two-digit years up to this value land in the 2000s, above it in the 1900s
    #[serde(default = "default_year_threshold")]
    pub year_threshold: u32,
    /// Whether `--wipe` is permitted at all
    #[serde(default = "default_true")]
    pub allow_wipe: bool,
}

fn default_blank_markers() -> Vec<String> {
    ["", "-", "nan", "NaN", "None", "N/A"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_separator() -> String {
    ",".to_string()
}

fn default_year_threshold() -> u32 {
    50
}

fn default_true() -> bool {
    true
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            blank_markers: default_blank_markers(),
            multi_value_separator: default_separator(),
            year_threshold: default_year_threshold(),
            allow_wipe: true,
        }
    }
}

/// Application configuration (view over settings.json)
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub import: ImportSettings,
}

impl Config {
    /// Load config from the data directory
    ///
    /// A missing or malformed file yields defaults. `GODSACRE_ALLOW_WIPE`
    /// overrides `allowWipe` (for CI and shared installs).
    pub fn load(data_dir: &Path) -> Result<Self> {
        let settings_path = data_dir.join("settings.json");

        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            serde_json::from_str(&content).unwrap_or_default()
        } else {
            SettingsFile::default()
        };

        let mut import = raw.import;
        match std::env::var("GODSACRE_ALLOW_WIPE").ok().as_deref() {
            Some("true" | "1" | "yes" | "TRUE" | "YES") => import.allow_wipe = true,
            Some("false" | "0" | "no" | "FALSE" | "NO") => import.allow_wipe = false,
            _ => {}
        }

        Ok(Self { import })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.import.year_threshold, 50);
        assert_eq!(config.import.multi_value_separator, ",");
        assert!(config.import.blank_markers.contains(&"N/A".to_string()));
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"import": {"multiValueSeparator": ";"}}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.import.multi_value_separator, ";");
        assert_eq!(config.import.year_threshold, 50);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{ not json").unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.import, ImportSettings::default());
    }

    #[test]
    fn test_unmanaged_sections_are_ignored() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"web": {"port": 8000}, "import": {"yearThreshold": 30, "allowWipe": false}}"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.import.year_threshold, 30);
        assert!(!config.import.allow_wipe);
        assert_eq!(config.import.multi_value_separator, ",");
    }
}
