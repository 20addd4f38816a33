use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::data::loader::SourceKind;

// ---------------------------------------------------------------------------
// Chart configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything the renderer needs besides the data itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartConfig {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Output image size in pixels.
    pub width: u32,
    pub height: u32,
    /// Fixed spacing of x-axis ticks; automatic when `None`.
    pub x_tick_step: Option<u32>,
}

impl ChartConfig {
    /// Labels and sizes each benchmark source has always been charted with.
    pub fn defaults_for(kind: SourceKind) -> Self {
        match kind {
            SourceKind::PerfReports => ChartConfig {
                title: "Context Switches vs Hash Bits".into(),
                x_label: "Hash Bits".into(),
                y_label: "Context Switches".into(),
                width: 800,
                height: 600,
                x_tick_step: Some(2),
            },
            SourceKind::ResultsCsv => ChartConfig {
                title: "Independent Partitioning Performance".into(),
                x_label: "Hash Bits".into(),
                y_label: "Millions of Tuples per Second".into(),
                width: 800,
                height: 600,
                x_tick_step: None,
            },
            SourceKind::ThroughputLog => ChartConfig {
                title: "Concurrent Scaling with Data Partitioning".into(),
                x_label: "Hash Bits".into(),
                y_label: "Throughput (MTuple/s)".into(),
                width: 1000,
                height: 600,
                x_tick_step: None,
            },
        }
    }

    /// Apply every field present in `overrides`.
    pub fn merge(&mut self, overrides: ChartOverrides) {
        if let Some(v) = overrides.title {
            self.title = v;
        }
        if let Some(v) = overrides.x_label {
            self.x_label = v;
        }
        if let Some(v) = overrides.y_label {
            self.y_label = v;
        }
        if let Some(v) = overrides.width {
            self.width = v;
        }
        if let Some(v) = overrides.height {
            self.height = v;
        }
        if let Some(v) = overrides.x_tick_step {
            self.x_tick_step = Some(v);
        }
    }
}

/// Partial chart configuration, as read from a JSON file or the command line.
/// Absent fields keep their defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChartOverrides {
    pub title: Option<String>,
    pub x_label: Option<String>,
    pub y_label: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub x_tick_step: Option<u32>,
}

impl ChartOverrides {
    /// Read overrides from a JSON file:
    ///
    /// ```json
    /// { "title": "Run 7", "width": 1200, "x_tick_step": 4 }
    /// ```
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn json_overrides_keep_unset_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chart.json");
        std::fs::write(&path, r#"{ "title": "Run 7", "width": 1200 }"#).unwrap();

        let mut cfg = ChartConfig::defaults_for(SourceKind::PerfReports);
        cfg.merge(ChartOverrides::from_json_file(&path).unwrap());

        assert_eq!(cfg.title, "Run 7");
        assert_eq!(cfg.width, 1200);
        assert_eq!(cfg.height, 600);
        assert_eq!(cfg.y_label, "Context Switches");
        assert_eq!(cfg.x_tick_step, Some(2));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chart.json");
        std::fs::write(&path, r#"{ "colour": "red" }"#).unwrap();
        assert!(matches!(
            ChartOverrides::from_json_file(&path),
            Err(ConfigError::Json { .. })
        ));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let dir = tempdir().unwrap();
        let err = ChartOverrides::from_json_file(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("absent.json"));
    }
}
