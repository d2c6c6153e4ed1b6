use crate::kiosk::{parse_sponsor_lines, Action, Command, ControllerEngine, DisplayMode, FeedSlot};
use chrono::{DateTime, Local};

pub const HELP: &str = "\
Commands:
  mode <id|all> <primary|secondary|showcase>
  slide <id|all> <n>
  next <id|all>
  auto <id|all> <on|off>
  duration <id|all> <seconds>
  url <id|all> <primary|secondary> <url>
  sponsors <id|all> <logo-url>...
  refresh <id>
  status
  raw <json>
  help
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    One(String),
    All,
}

impl Target {
    fn parse(token: &str) -> Target {
        if token.eq_ignore_ascii_case("all") {
            Target::All
        } else {
            Target::One(token.to_string())
        }
    }
}

/// One line of operator input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Apply { target: Target, action: Action },
    Refresh(String),
    Status,
    Raw(String),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue(String),
    Quit,
}

/// Parse a console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    let Some((verb, rest)) = split_word(line) else {
        return Ok(None);
    };

    let command = match verb {
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        "status" => ConsoleCommand::Status,
        "raw" => {
            if rest.is_empty() {
                return Err("usage: raw <json>".to_string());
            }
            ConsoleCommand::Raw(rest.to_string())
        }
        "refresh" => match rest.split_whitespace().next() {
            Some(id) => ConsoleCommand::Refresh(id.to_string()),
            None => return Err("usage: refresh <id>".to_string()),
        },
        "mode" | "slide" | "next" | "auto" | "duration" | "url" | "sponsors" => {
            let (target, args) =
                split_word(rest).ok_or_else(|| format!("{}: missing display id or 'all'", verb))?;
            ConsoleCommand::Apply {
                target: Target::parse(target),
                action: parse_action(verb, args)?,
            }
        }
        other => return Err(format!("Unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim_start();
    if text.is_empty() {
        return None;
    }
    match text.split_once(char::is_whitespace) {
        Some((word, rest)) => Some((word, rest.trim())),
        None => Some((text, "")),
    }
}

fn parse_action(verb: &str, args: &str) -> Result<Action, String> {
    let mut words = args.split_whitespace();
    let mut next = |what: &str| {
        words
            .next()
            .ok_or_else(|| format!("{}: missing {}", verb, what))
    };

    let action = match verb {
        "mode" => Action::SetMode {
            mode: next("mode")?.parse::<DisplayMode>()?,
        },
        "slide" => {
            let raw = next("slide index")?;
            let index = raw
                .parse::<usize>()
                .map_err(|_| format!("slide: '{}' is not a slide index", raw))?;
            Action::SetSlide { index }
        }
        "next" => Action::AdvanceSlide,
        "auto" => {
            let enabled = match next("on|off")? {
                "on" | "true" | "yes" => true,
                "off" | "false" | "no" => false,
                other => return Err(format!("auto: expected on or off, got '{}'", other)),
            };
            Action::SetAutoAdvance { enabled }
        }
        "duration" => {
            let raw = next("seconds")?;
            let seconds = raw
                .parse::<u32>()
                .map_err(|_| format!("duration: '{}' is not a number of seconds", raw))?;
            Action::SetSlideDuration { seconds }
        }
        "url" => {
            let slot = next("feed slot")?.parse::<FeedSlot>()?;
            let url = next("url")?.to_string();
            Action::SetFeedUrl { slot, url }
        }
        "sponsors" => {
            let lines = args.split_whitespace().collect::<Vec<_>>().join("\n");
            Action::ReplaceSponsors {
                sponsors: parse_sponsor_lines(&lines),
            }
        }
        other => return Err(format!("Unknown command '{}'", other)),
    };
    Ok(action)
}

/// Run a parsed command against the controller.
pub fn execute(controller: &mut ControllerEngine, command: ConsoleCommand) -> Outcome {
    let message = match command {
        ConsoleCommand::Apply { target, action } => {
            let kind = action.kind();
            match target {
                Target::All => {
                    let sent = controller.apply_to_all(action);
                    format!("{} sent to {} displays", kind, sent)
                }
                Target::One(id) => match controller.send_action(&id, action) {
                    Ok(()) => format!("{} sent to {}", kind, id),
                    Err(e) => format!("Error: {}", e),
                },
            }
        }
        ConsoleCommand::Refresh(id) => match controller.request_state(&id) {
            Ok(()) => format!("Requested state from {}", id),
            Err(e) => format!("Error: {}", e),
        },
        ConsoleCommand::Raw(payload) => {
            let note = match Command::decode(&payload) {
                Ok(command) => command.kind().to_string(),
                Err(e) => format!("undecodable, {}", e),
            };
            controller.post_raw(payload);
            format!("Posted raw payload ({})", note)
        }
        ConsoleCommand::Status => format_status(controller),
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => return Outcome::Quit,
    };
    Outcome::Continue(message)
}

/// One line per configured display, in configuration order.
pub fn format_status(controller: &ControllerEngine) -> String {
    let config = controller.config();
    let mut lines = Vec::with_capacity(config.displays.len());

    for display in &config.displays {
        let Some(state) = controller.replica(&display.id) else {
            continue;
        };
        let link = match controller.last_seen(&display.id) {
            Some(ms) => match DateTime::from_timestamp_millis(ms) {
                Some(at) => format!("seen {}", at.with_timezone(&Local).format("%H:%M:%S")),
                None => "seen".to_string(),
            },
            None => "offline".to_string(),
        };
        let slide = match state.current_sponsor() {
            Some(sponsor) => format!(
                "slide {}/{} ({}) every {}s",
                state.current_slide_index.saturating_add(1),
                state.sponsors.len(),
                sponsor.name,
                state.slide_duration_seconds
            ),
            None if state.sponsors.is_empty() => "no sponsors".to_string(),
            None => format!("slide ?/{}", state.sponsors.len()),
        };
        lines.push(format!(
            "{:<6} {:<16} {:<9} {:<10} {} auto {}",
            display.id,
            display.name,
            link,
            state.mode.to_string(),
            slide,
            if state.auto_advance_enabled { "on" } else { "off" }
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KioskConfig;
    use crate::kiosk::{Sponsor, SyncContext};

    fn apply(target: Target, action: Action) -> Option<ConsoleCommand> {
        Some(ConsoleCommand::Apply { target, action })
    }

    #[test]
    fn test_parse_mode_commands() {
        assert_eq!(
            parse_line("mode tv2 showcase"),
            Ok(apply(
                Target::One("tv2".to_string()),
                Action::SetMode {
                    mode: DisplayMode::SponsorShowcase
                }
            ))
        );
        assert_eq!(
            parse_line("  mode ALL primary "),
            Ok(apply(
                Target::All,
                Action::SetMode {
                    mode: DisplayMode::PrimaryFeed
                }
            ))
        );
        assert!(parse_line("mode tv2 sideways").is_err());
        assert!(parse_line("mode").is_err());
    }

    #[test]
    fn test_parse_slide_and_timing() {
        assert_eq!(
            parse_line("slide tv1 3"),
            Ok(apply(
                Target::One("tv1".to_string()),
                Action::SetSlide { index: 3 }
            ))
        );
        assert_eq!(
            parse_line("next all"),
            Ok(apply(Target::All, Action::AdvanceSlide))
        );
        assert_eq!(
            parse_line("auto tv4 off"),
            Ok(apply(
                Target::One("tv4".to_string()),
                Action::SetAutoAdvance { enabled: false }
            ))
        );
        assert_eq!(
            parse_line("duration tv4 12"),
            Ok(apply(
                Target::One("tv4".to_string()),
                Action::SetSlideDuration { seconds: 12 }
            ))
        );
        assert!(parse_line("slide tv1 -1").is_err());
        assert!(parse_line("duration tv1 soon").is_err());
    }

    #[test]
    fn test_parse_url_and_sponsors() {
        assert_eq!(
            parse_line("url tv3 secondary https://example.com/live"),
            Ok(apply(
                Target::One("tv3".to_string()),
                Action::SetFeedUrl {
                    slot: FeedSlot::Secondary,
                    url: "https://example.com/live".to_string()
                }
            ))
        );
        assert_eq!(
            parse_line("sponsors tv1 https://a.example/x.png not-a-url http://b.example/y.png"),
            Ok(apply(
                Target::One("tv1".to_string()),
                Action::ReplaceSponsors {
                    sponsors: Sponsor::sequence_from_urls([
                        "https://a.example/x.png",
                        "http://b.example/y.png"
                    ])
                }
            ))
        );
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(parse_line(""), Ok(None));
        assert_eq!(parse_line("   "), Ok(None));
        assert_eq!(parse_line("status"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(parse_line("quit"), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(
            parse_line("refresh tv2"),
            Ok(Some(ConsoleCommand::Refresh("tv2".to_string())))
        );
        assert_eq!(
            parse_line(r#"raw {"type":"REQUEST_STATE","display_id":"tv1"}"#),
            Ok(Some(ConsoleCommand::Raw(
                r#"{"type":"REQUEST_STATE","display_id":"tv1"}"#.to_string()
            )))
        );
        assert!(parse_line("raw").is_err());
        assert!(parse_line("reboot tv1").is_err());
    }

    #[test]
    fn test_execute_against_controller() {
        let ctx = SyncContext::in_memory(KioskConfig::default());
        let mut controller = ControllerEngine::activate(&ctx);

        let outcome = execute(
            &mut controller,
            ConsoleCommand::Apply {
                target: Target::One("tv2".to_string()),
                action: Action::SetMode {
                    mode: DisplayMode::SecondaryFeed,
                },
            },
        );
        assert_eq!(outcome, Outcome::Continue("SET_MODE sent to tv2".to_string()));
        assert_eq!(
            controller.replica("tv2").map(|s| s.mode),
            Some(DisplayMode::SecondaryFeed)
        );

        let outcome = execute(
            &mut controller,
            ConsoleCommand::Apply {
                target: Target::All,
                action: Action::SetAutoAdvance { enabled: false },
            },
        );
        assert_eq!(
            outcome,
            Outcome::Continue("SET_AUTO_ADVANCE sent to 4 displays".to_string())
        );

        match execute(&mut controller, ConsoleCommand::Refresh("tv9".to_string())) {
            Outcome::Continue(message) => assert!(message.starts_with("Error:")),
            Outcome::Quit => panic!("refresh must not quit"),
        }
        assert_eq!(execute(&mut controller, ConsoleCommand::Quit), Outcome::Quit);
    }

    #[test]
    fn test_status_lists_every_display() {
        let ctx = SyncContext::in_memory(KioskConfig::default());
        let controller = ControllerEngine::activate(&ctx);

        let status = format_status(&controller);
        let lines: Vec<&str> = status.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("tv1"));
        assert!(lines.iter().all(|line| line.contains("offline")));
        assert!(lines[2].contains("slide 1/4 (Premium Sponsor) every 5s"));
    }
}
