//! Kiosk configuration, loaded once at startup and immutable afterwards.

use crate::error::ConfigError;
use crate::kiosk::types::Sponsor;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Environment variable naming a JSON config file
pub const CONFIG_ENV: &str = "KIOSK_CONFIG";

/// One configured television
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub id: String,
    pub name: String,
}

/// Feed URLs a fresh display starts with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedUrls {
    pub primary: String,
    pub secondary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnimationStyle {
    Fade,
    FadeZoom,
    SlideLeft,
    SlideRight,
    SlideUp,
    None,
}

/// Transition settings consumed by the rendering layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationConfig {
    pub style: AnimationStyle,
    /// Length of one transition phase in milliseconds
    pub duration_ms: u64,
    pub slide_style: AnimationStyle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub displays: Vec<DisplayConfig>,
    pub default_urls: FeedUrls,
    pub sponsors: Vec<Sponsor>,
    pub default_slide_seconds: u32,
    /// Show sponsors every N seconds (advisory)
    pub default_auto_showcase_seconds: u32,
    /// Return to the primary feed after N seconds (advisory)
    pub default_auto_return_seconds: u32,
    pub animation: AnimationConfig,
    pub channel_name: String,
    pub storage_key_prefix: String,
}

impl Default for KioskConfig {
    fn default() -> Self {
        let displays = (1..=4)
            .map(|n| DisplayConfig {
                id: format!("tv{}", n),
                name: format!("TV {}", n),
            })
            .collect();

        let sponsors = [
            ("Premium Sponsor", "photo-1611532736597-de2d4265fba3"),
            ("Gold Sponsor", "photo-1599305445671-ac291c95aaa9"),
            ("Silver Sponsor", "photo-1560179707-f14e90ef3623"),
            ("Bronze Sponsor", "photo-1486406146926-c627a92ad1ab"),
        ]
        .iter()
        .zip(1u32..)
        .map(|((name, photo), id)| Sponsor {
            id,
            name: name.to_string(),
            logo_url: format!(
                "https://images.unsplash.com/{}?w=800&h=400&fit=crop",
                photo
            ),
        })
        .collect();

        Self {
            displays,
            default_urls: FeedUrls {
                primary: "https://www.formula1.com/en/racing/2024".to_string(),
                secondary: "https://www.formula1.com/en/results/2024/races".to_string(),
            },
            sponsors,
            default_slide_seconds: 5,
            default_auto_showcase_seconds: 300,
            default_auto_return_seconds: 30,
            animation: AnimationConfig {
                style: AnimationStyle::FadeZoom,
                duration_ms: 500,
                slide_style: AnimationStyle::Fade,
            },
            channel_name: "kiosk-sync-channel-v2".to_string(),
            storage_key_prefix: "kiosk-state-".to_string(),
        }
    }
}

impl KioskConfig {
    /// Read and validate a JSON config file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&raw)?;
        info!(
            "Loaded config from {} ({} displays)",
            path.display(),
            config.displays.len()
        );
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Config file from `KIOSK_CONFIG` or an explicit path, else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => {
                warn!("No config file given, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.displays.is_empty() {
            return Err(ConfigError::NoDisplays);
        }
        let mut seen = HashSet::new();
        for display in &self.displays {
            if !seen.insert(display.id.as_str()) {
                return Err(ConfigError::DuplicateDisplay(display.id.clone()));
            }
        }
        if self.default_slide_seconds == 0 {
            return Err(ConfigError::InvalidSlideDuration);
        }
        Ok(())
    }

    pub fn display_ids(&self) -> impl Iterator<Item = &str> {
        self.displays.iter().map(|d| d.id.as_str())
    }

    pub fn is_configured(&self, display_id: &str) -> bool {
        self.display_ids().any(|id| id == display_id)
    }

    pub fn first_display(&self) -> Option<&str> {
        self.display_ids().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = KioskConfig::default();
        config.validate().unwrap();
        assert_eq!(
            config.display_ids().collect::<Vec<_>>(),
            vec!["tv1", "tv2", "tv3", "tv4"]
        );
        assert_eq!(config.sponsors.len(), 4);
        assert_eq!(config.sponsors[0].id, 1);
        assert_eq!(config.storage_key_prefix, "kiosk-state-");
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let json = r#"{"displays":[{"id":"lobby","name":"Lobby"}],"default_slide_seconds":8}"#;
        let config = KioskConfig::from_json(json).unwrap();
        assert_eq!(config.first_display(), Some("lobby"));
        assert_eq!(config.default_slide_seconds, 8);
        assert_eq!(config.channel_name, "kiosk-sync-channel-v2");
        assert_eq!(config.animation.style, AnimationStyle::FadeZoom);
    }

    #[test]
    fn test_animation_style_names() {
        let json = r#"{"style":"slide-left","duration_ms":300,"slide_style":"none"}"#;
        let animation: AnimationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(animation.style, AnimationStyle::SlideLeft);
        assert_eq!(animation.slide_style, AnimationStyle::None);
    }

    #[test]
    fn test_rejects_duplicate_displays() {
        let json = r#"{"displays":[{"id":"tv1","name":"A"},{"id":"tv1","name":"B"}]}"#;
        match KioskConfig::from_json(json) {
            Err(ConfigError::DuplicateDisplay(id)) => assert_eq!(id, "tv1"),
            other => panic!("Expected duplicate error, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_empty_display_list() {
        let json = r#"{"displays":[]}"#;
        assert!(matches!(
            KioskConfig::from_json(json),
            Err(ConfigError::NoDisplays)
        ));
    }

    #[test]
    fn test_rejects_zero_slide_duration() {
        let json = r#"{"default_slide_seconds":0}"#;
        assert!(matches!(
            KioskConfig::from_json(json),
            Err(ConfigError::InvalidSlideDuration)
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosk.json");
        std::fs::write(&path, r#"{"channel_name":"test-channel"}"#).unwrap();

        let config = KioskConfig::load(&path).unwrap();
        assert_eq!(config.channel_name, "test-channel");

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            KioskConfig::load(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
