//! Configuration system
//!
//! Renderer defaults and headless backend behavior are loaded from TOML or RON
//! files through the [`Config`] trait.

pub use serde::{Serialize, Deserialize};

use crate::scene::RenderFlags;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Defaults applied to every renderer created by a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Raw [`RenderFlags`] bits; unknown bits are dropped when read
    pub render_flags: u32,
    /// Distance shadow rays are pushed off the surface before tracing
    pub shadow_ray_offset: f32,
    /// Distance under which hits on the same instance are ignored
    pub self_shadow_threshold: f32,
    /// Headless backend behavior
    pub headless: HeadlessConfig,
}

impl ShadowConfig {
    /// Render flags with unknown bits discarded
    pub fn render_flags(&self) -> RenderFlags {
        RenderFlags::from_bits_truncate(self.render_flags)
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            render_flags: RenderFlags::CULL_BACK_FACES.bits(),
            shadow_ray_offset: 0.0001,
            self_shadow_threshold: 0.001,
            headless: HeadlessConfig::default(),
        }
    }
}

impl Config for ShadowConfig {}

/// Settings for the CPU-side headless backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadlessConfig {
    /// Artificial delay per submission, emulating GPU work
    pub simulated_latency_ms: u64,
    /// Report a runtime failure for scenes submitted without a camera
    pub fail_without_camera: bool,
    /// Frame reports retained for inspection; the oldest are dropped first
    pub max_reports: usize,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            simulated_latency_ms: 0,
            fail_without_camera: false,
            max_reports: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flags_cull_back_faces() {
        let config = ShadowConfig::default();
        assert_eq!(config.render_flags(), RenderFlags::CULL_BACK_FACES);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ShadowConfig = toml::from_str(
            "shadow_ray_offset = 0.5\n[headless]\nsimulated_latency_ms = 3\n",
        )
        .unwrap();
        assert_eq!(config.shadow_ray_offset, 0.5);
        assert_eq!(config.self_shadow_threshold, 0.001);
        assert_eq!(config.headless.simulated_latency_ms, 3);
        assert!(!config.headless.fail_without_camera);
        assert_eq!(config.headless.max_reports, 256);
    }

    #[test]
    fn test_unknown_flag_bits_are_dropped() {
        let config = ShadowConfig { render_flags: 0xffff_0000 | 0x2, ..Default::default() };
        assert_eq!(config.render_flags(), RenderFlags::IGNORE_SELF_SHADOW);
    }

    #[test]
    fn test_round_trip_through_files() {
        let dir = std::env::temp_dir();
        let config = ShadowConfig {
            shadow_ray_offset: 0.25,
            headless: HeadlessConfig { simulated_latency_ms: 2, fail_without_camera: true, max_reports: 8 },
            ..Default::default()
        };

        for name in ["raytraced_shadow_cfg_test.toml", "raytraced_shadow_cfg_test.ron"] {
            let path = dir.join(name);
            let path = path.to_str().unwrap();
            config.save_to_file(path).unwrap();
            let loaded = ShadowConfig::load_from_file(path).unwrap();
            assert_eq!(loaded, config);
            let _ = std::fs::remove_file(path);
        }
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let err = ShadowConfig::default().save_to_file("config.json").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }
}
