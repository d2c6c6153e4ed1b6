use crate::error::ProtocolError;
use crate::kiosk::types::{DisplayMode, DisplayState, FeedSlot, Sponsor};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A state mutation without a target display.
///
/// `ApplyToAll` carries one of these; the originator turns it into one
/// addressed [`Command`] per configured display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    SetMode { mode: DisplayMode },
    SetSlide { index: usize },
    AdvanceSlide,
    SetAutoAdvance { enabled: bool },
    SetSlideDuration { seconds: u32 },
    SetFeedUrl { slot: FeedSlot, url: String },
    ReplaceSponsors { sponsors: Vec<Sponsor> },
}

impl Action {
    /// Apply to a state in place. Returns false when the action was a no-op.
    pub fn apply(&self, state: &mut DisplayState, now: i64) -> bool {
        match self {
            Action::SetMode { mode } => {
                state.mode = *mode;
                state.current_slide_index = 0;
            }
            Action::SetSlide { index } => {
                state.current_slide_index = clamp_slide(*index, state.sponsors.len());
            }
            Action::AdvanceSlide => {
                if state.sponsors.is_empty() {
                    debug!("{}: no sponsors, advance ignored", state.display_id);
                    return false;
                }
                let len = state.sponsors.len();
                state.current_slide_index = (state.current_slide_index % len + 1) % len;
            }
            Action::SetAutoAdvance { enabled } => {
                state.auto_advance_enabled = *enabled;
            }
            Action::SetSlideDuration { seconds } => {
                state.slide_duration_seconds = (*seconds).max(1);
            }
            Action::SetFeedUrl { slot, url } => match slot {
                FeedSlot::Primary => state.primary_feed_url = url.clone(),
                FeedSlot::Secondary => state.secondary_feed_url = url.clone(),
            },
            Action::ReplaceSponsors { sponsors } => {
                state.sponsors = sponsors.clone();
                state.current_slide_index = 0;
            }
        }
        state.touch(now);
        true
    }

    /// Wire name of the addressed command this action becomes
    pub fn kind(&self) -> &'static str {
        match self {
            Action::SetMode { .. } => "SET_MODE",
            Action::SetSlide { .. } => "SET_SLIDE",
            Action::AdvanceSlide => "ADVANCE_SLIDE",
            Action::SetAutoAdvance { .. } => "SET_AUTO_ADVANCE",
            Action::SetSlideDuration { .. } => "SET_SLIDE_DURATION",
            Action::SetFeedUrl { .. } => "SET_FEED_URL",
            Action::ReplaceSponsors { .. } => "REPLACE_SPONSORS",
        }
    }

    /// Whether applying this action puts the slide index in a new place
    /// that deserves a full slide duration on screen.
    pub fn restarts_slideshow(&self) -> bool {
        matches!(
            self,
            Action::SetMode { .. } | Action::SetSlide { .. } | Action::ReplaceSponsors { .. }
        )
    }

    /// Whether the controller writes its optimistic replica through to storage.
    ///
    /// Rapid interactions (mode, slide, toggles) only update the replica.
    pub fn persists_on_controller(&self) -> bool {
        matches!(
            self,
            Action::SetFeedUrl { .. } | Action::ReplaceSponsors { .. }
        )
    }
}

fn clamp_slide(index: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        index.min(len - 1)
    }
}

/// Messages exchanged between the controller and the displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    SetMode {
        display_id: String,
        mode: DisplayMode,
    },
    SetSlide {
        display_id: String,
        index: usize,
    },
    AdvanceSlide {
        display_id: String,
    },
    SetAutoAdvance {
        display_id: String,
        enabled: bool,
    },
    SetSlideDuration {
        display_id: String,
        seconds: u32,
    },
    SetFeedUrl {
        display_id: String,
        slot: FeedSlot,
        url: String,
    },
    ReplaceSponsors {
        display_id: String,
        sponsors: Vec<Sponsor>,
    },
    /// A display's full state, sent in reply to `RequestState`
    ReportState {
        display_id: String,
        state: DisplayState,
    },
    RequestState {
        display_id: String,
    },
    /// Meta-command, expanded by the originator before dispatch
    ApplyToAll {
        action: Action,
    },
}

impl Command {
    pub fn addressed(display_id: impl Into<String>, action: Action) -> Command {
        let display_id = display_id.into();
        match action {
            Action::SetMode { mode } => Command::SetMode { display_id, mode },
            Action::SetSlide { index } => Command::SetSlide { display_id, index },
            Action::AdvanceSlide => Command::AdvanceSlide { display_id },
            Action::SetAutoAdvance { enabled } => Command::SetAutoAdvance {
                display_id,
                enabled,
            },
            Action::SetSlideDuration { seconds } => Command::SetSlideDuration {
                display_id,
                seconds,
            },
            Action::SetFeedUrl { slot, url } => Command::SetFeedUrl {
                display_id,
                slot,
                url,
            },
            Action::ReplaceSponsors { sponsors } => Command::ReplaceSponsors {
                display_id,
                sponsors,
            },
        }
    }

    /// The display this command is addressed to. `None` for `ApplyToAll`.
    pub fn target(&self) -> Option<&str> {
        match self {
            Command::SetMode { display_id, .. }
            | Command::SetSlide { display_id, .. }
            | Command::AdvanceSlide { display_id }
            | Command::SetAutoAdvance { display_id, .. }
            | Command::SetSlideDuration { display_id, .. }
            | Command::SetFeedUrl { display_id, .. }
            | Command::ReplaceSponsors { display_id, .. }
            | Command::ReportState { display_id, .. }
            | Command::RequestState { display_id } => Some(display_id),
            Command::ApplyToAll { .. } => None,
        }
    }

    /// Split an addressed mutation into its target and action.
    ///
    /// Returns `None` for the handshake kinds and for `ApplyToAll`.
    pub fn into_action(self) -> Option<(String, Action)> {
        let pair = match self {
            Command::SetMode { display_id, mode } => (display_id, Action::SetMode { mode }),
            Command::SetSlide { display_id, index } => (display_id, Action::SetSlide { index }),
            Command::AdvanceSlide { display_id } => (display_id, Action::AdvanceSlide),
            Command::SetAutoAdvance {
                display_id,
                enabled,
            } => (display_id, Action::SetAutoAdvance { enabled }),
            Command::SetSlideDuration {
                display_id,
                seconds,
            } => (display_id, Action::SetSlideDuration { seconds }),
            Command::SetFeedUrl {
                display_id,
                slot,
                url,
            } => (display_id, Action::SetFeedUrl { slot, url }),
            Command::ReplaceSponsors {
                display_id,
                sponsors,
            } => (display_id, Action::ReplaceSponsors { sponsors }),
            Command::ReportState { .. }
            | Command::RequestState { .. }
            | Command::ApplyToAll { .. } => return None,
        };
        Some(pair)
    }

    /// Expand `ApplyToAll` into one addressed command per display.
    /// Any other command expands to itself.
    pub fn expand<'a, I>(self, display_ids: I) -> Vec<Command>
    where
        I: IntoIterator<Item = &'a str>,
    {
        match self {
            Command::ApplyToAll { action } => display_ids
                .into_iter()
                .map(|id| Command::addressed(id, action.clone()))
                .collect(),
            other => vec![other],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::SetMode { .. } => "SET_MODE",
            Command::SetSlide { .. } => "SET_SLIDE",
            Command::AdvanceSlide { .. } => "ADVANCE_SLIDE",
            Command::SetAutoAdvance { .. } => "SET_AUTO_ADVANCE",
            Command::SetSlideDuration { .. } => "SET_SLIDE_DURATION",
            Command::SetFeedUrl { .. } => "SET_FEED_URL",
            Command::ReplaceSponsors { .. } => "REPLACE_SPONSORS",
            Command::ReportState { .. } => "REPORT_STATE",
            Command::RequestState { .. } => "REQUEST_STATE",
            Command::ApplyToAll { .. } => "APPLY_TO_ALL",
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn decode(payload: &str) -> Result<Command, ProtocolError> {
        serde_json::from_str(payload).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KioskConfig;

    fn state_with_sponsors(count: usize) -> DisplayState {
        let mut state = DisplayState::new_default("tv1", &KioskConfig::default());
        state.sponsors =
            Sponsor::sequence_from_urls((0..count).map(|i| format!("https://x/{}.png", i)));
        state
    }

    #[test]
    fn test_serialize_set_mode() {
        let cmd = Command::SetMode {
            display_id: "tv3".to_string(),
            mode: DisplayMode::SponsorShowcase,
        };
        let json = cmd.encode().unwrap();
        assert!(json.contains(r#""type":"SET_MODE""#));
        assert!(json.contains(r#""display_id":"tv3""#));
        assert!(json.contains(r#""mode":"sponsor_showcase""#));
    }

    #[test]
    fn test_deserialize_apply_to_all() {
        let json = r#"{"type":"APPLY_TO_ALL","action":{"type":"SET_FEED_URL","slot":"secondary","url":"https://x/live"}}"#;
        let cmd = Command::decode(json).unwrap();
        match cmd {
            Command::ApplyToAll { action } => assert_eq!(
                action,
                Action::SetFeedUrl {
                    slot: FeedSlot::Secondary,
                    url: "https://x/live".to_string(),
                }
            ),
            other => panic!("Expected ApplyToAll, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(Command::decode("{not json").is_err());
        assert!(Command::decode(r#"{"type":"SET_MODE","display_id":"tv1"}"#).is_err());
        assert!(Command::decode(r#"{"type":"REBOOT","display_id":"tv1"}"#).is_err());
    }

    #[test]
    fn test_set_mode_resets_slide_and_is_idempotent() {
        let mut state = state_with_sponsors(3);
        state.current_slide_index = 2;
        let action = Action::SetMode {
            mode: DisplayMode::SponsorShowcase,
        };

        action.apply(&mut state, 10);
        let once = state.clone();
        action.apply(&mut state, 10);

        assert_eq!(state, once);
        assert_eq!(state.mode, DisplayMode::SponsorShowcase);
        assert_eq!(state.current_slide_index, 0);
    }

    #[test]
    fn test_replace_sponsors_resets_slide() {
        let mut state = state_with_sponsors(4);
        state.current_slide_index = 3;
        let sponsors = Sponsor::sequence_from_urls(["https://x/a.png", "https://x/b.png"]);
        Action::ReplaceSponsors {
            sponsors: sponsors.clone(),
        }
        .apply(&mut state, 10);

        assert_eq!(state.sponsors, sponsors);
        assert_eq!(state.current_slide_index, 0);
    }

    #[test]
    fn test_advance_wraps_within_sponsor_count() {
        let mut state = state_with_sponsors(2);
        let mut seen = vec![state.current_slide_index];
        for _ in 0..3 {
            assert!(Action::AdvanceSlide.apply(&mut state, 10));
            seen.push(state.current_slide_index);
        }
        assert_eq!(seen, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_advance_from_out_of_range_index_stays_in_bounds() {
        let mut state = state_with_sponsors(3);
        state.current_slide_index = usize::MAX;
        assert!(Action::AdvanceSlide.apply(&mut state, 10));
        assert!(state.current_slide_index < 3);
    }

    #[test]
    fn test_index_resets_restart_the_slideshow() {
        assert!(Action::SetMode {
            mode: DisplayMode::SponsorShowcase
        }
        .restarts_slideshow());
        assert!(Action::ReplaceSponsors { sponsors: vec![] }.restarts_slideshow());
        assert!(Action::SetSlide { index: 1 }.restarts_slideshow());
        assert!(!Action::AdvanceSlide.restarts_slideshow());
        assert!(!Action::SetAutoAdvance { enabled: true }.restarts_slideshow());
    }

    #[test]
    fn test_advance_with_no_sponsors_is_noop() {
        let mut state = state_with_sponsors(0);
        let before = state.clone();
        assert!(!Action::AdvanceSlide.apply(&mut state, before.last_update_timestamp + 100));
        assert_eq!(state, before);
    }

    #[test]
    fn test_set_slide_clamps_to_sponsor_list() {
        let mut state = state_with_sponsors(3);
        Action::SetSlide { index: 7 }.apply(&mut state, 10);
        assert_eq!(state.current_slide_index, 2);

        let mut empty = state_with_sponsors(0);
        Action::SetSlide { index: 7 }.apply(&mut empty, 10);
        assert_eq!(empty.current_slide_index, 0);
    }

    #[test]
    fn test_slide_duration_floor() {
        let mut state = state_with_sponsors(1);
        Action::SetSlideDuration { seconds: 0 }.apply(&mut state, 10);
        assert_eq!(state.slide_duration_seconds, 1);
    }

    #[test]
    fn test_set_feed_url_targets_one_slot() {
        let mut state = state_with_sponsors(1);
        let secondary = state.secondary_feed_url.clone();
        Action::SetFeedUrl {
            slot: FeedSlot::Primary,
            url: "https://x/new".to_string(),
        }
        .apply(&mut state, 10);
        assert_eq!(state.primary_feed_url, "https://x/new");
        assert_eq!(state.secondary_feed_url, secondary);
    }

    #[test]
    fn test_expand_apply_to_all() {
        let cmd = Command::ApplyToAll {
            action: Action::SetMode {
                mode: DisplayMode::SponsorShowcase,
            },
        };
        let expanded = cmd.expand(["tv1", "tv2", "tv3", "tv4"]);
        assert_eq!(expanded.len(), 4);
        for (cmd, id) in expanded.iter().zip(["tv1", "tv2", "tv3", "tv4"]) {
            assert_eq!(cmd.target(), Some(id));
            assert_eq!(cmd.kind(), "SET_MODE");
        }
    }

    #[test]
    fn test_addressed_commands_split_back() {
        let action = Action::SetFeedUrl {
            slot: FeedSlot::Secondary,
            url: "https://x/b".to_string(),
        };
        let cmd = Command::addressed("tv2", action.clone());
        assert_eq!(cmd.into_action(), Some(("tv2".to_string(), action)));

        let request = Command::RequestState {
            display_id: "tv2".to_string(),
        };
        assert_eq!(request.into_action(), None);
    }

    #[test]
    fn test_controller_persistence_policy() {
        assert!(Action::ReplaceSponsors { sponsors: vec![] }.persists_on_controller());
        assert!(Action::SetFeedUrl {
            slot: FeedSlot::Primary,
            url: String::new(),
        }
        .persists_on_controller());
        assert!(!Action::SetSlide { index: 0 }.persists_on_controller());
        assert!(!Action::SetMode {
            mode: DisplayMode::PrimaryFeed,
        }
        .persists_on_controller());
    }
}
