use crate::config::KioskConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a display is currently showing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    PrimaryFeed,
    SecondaryFeed,
    SponsorShowcase,
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" | "primary_feed" | "race" => Ok(Self::PrimaryFeed),
            "secondary" | "secondary_feed" | "race2" => Ok(Self::SecondaryFeed),
            "showcase" | "sponsor_showcase" | "sponsors" => Ok(Self::SponsorShowcase),
            other => Err(format!("Unknown mode: {}", other)),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrimaryFeed => "primary",
            Self::SecondaryFeed => "secondary",
            Self::SponsorShowcase => "showcase",
        };
        f.write_str(name)
    }
}

/// Which of the two feed URLs a command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSlot {
    Primary,
    Secondary,
}

impl FromStr for FeedSlot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" | "race" => Ok(Self::Primary),
            "secondary" | "race2" => Ok(Self::Secondary),
            other => Err(format!("Unknown feed slot: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sponsor {
    pub id: u32,
    pub name: String,
    pub logo_url: String,
}

impl Sponsor {
    /// Build a replacement list with sequential ids starting at 1
    pub fn sequence_from_urls<I, S>(urls: I) -> Vec<Sponsor>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        urls.into_iter()
            .zip(1u32..)
            .map(|(url, id)| Sponsor {
                id,
                name: format!("Sponsor {}", id),
                logo_url: url.into(),
            })
            .collect()
    }
}

/// Parse operator text (one logo URL per line) into a sponsor list.
///
/// Blank lines and anything that is not an http(s) URL are skipped.
pub fn parse_sponsor_lines(text: &str) -> Vec<Sponsor> {
    Sponsor::sequence_from_urls(
        text.lines()
            .map(str::trim)
            .filter(|line| line.starts_with("http://") || line.starts_with("https://")),
    )
}

/// Complete state of one display, persisted as a single snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    pub display_id: String,
    pub mode: DisplayMode,
    pub current_slide_index: usize,
    pub auto_advance_enabled: bool,
    pub slide_duration_seconds: u32,
    pub auto_showcase_interval_seconds: u32,
    pub auto_return_seconds: u32,
    pub primary_feed_url: String,
    pub secondary_feed_url: String,
    pub sponsors: Vec<Sponsor>,
    /// Epoch milliseconds of the last mutation
    pub last_update_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitioning: Option<bool>,
}

impl DisplayState {
    pub fn new_default(display_id: &str, config: &KioskConfig) -> Self {
        Self {
            display_id: display_id.to_string(),
            mode: DisplayMode::PrimaryFeed,
            current_slide_index: 0,
            auto_advance_enabled: false,
            slide_duration_seconds: config.default_slide_seconds,
            auto_showcase_interval_seconds: config.default_auto_showcase_seconds,
            auto_return_seconds: config.default_auto_return_seconds,
            primary_feed_url: config.default_urls.primary.clone(),
            secondary_feed_url: config.default_urls.secondary.clone(),
            sponsors: config.sponsors.clone(),
            last_update_timestamp: now_millis(),
            transitioning: Some(false),
        }
    }

    pub fn feed_url(&self, slot: FeedSlot) -> &str {
        match slot {
            FeedSlot::Primary => &self.primary_feed_url,
            FeedSlot::Secondary => &self.secondary_feed_url,
        }
    }

    pub fn current_sponsor(&self) -> Option<&Sponsor> {
        self.sponsors.get(self.current_slide_index)
    }

    /// Pull the slide index back into `[0, sponsors.len())`; 0 without
    /// sponsors. Returns true when the index had to change.
    pub fn normalize(&mut self) -> bool {
        let bounded = match self.sponsors.len() {
            0 => 0,
            len => self.current_slide_index.min(len - 1),
        };
        let changed = bounded != self.current_slide_index;
        self.current_slide_index = bounded;
        changed
    }

    /// Stamp a mutation. The timestamp never moves backwards.
    pub fn touch(&mut self, now: i64) {
        self.last_update_timestamp = now.max(self.last_update_timestamp);
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
