use crate::config::KioskConfig;
use crate::error::BootstrapError;
use tracing::debug;

/// Query parameter carrying the display identity
pub const DISPLAY_PARAM: &str = "id";

/// Resolve the display identity from a query string such as `?id=tv2`.
///
/// A missing or empty `id` selects the first configured display; an identity
/// that is not configured is rejected.
pub fn resolve_display_id(query: &str, config: &KioskConfig) -> Result<String, BootstrapError> {
    let requested = query_param(query, DISPLAY_PARAM).filter(|id| !id.is_empty());

    let display_id = match requested {
        Some(id) => id,
        None => {
            let first = config
                .first_display()
                .ok_or_else(|| BootstrapError::UnknownDisplay(String::new()))?;
            debug!("No display id in '{}', defaulting to {}", query, first);
            first.to_string()
        }
    };

    if config.is_configured(&display_id) {
        Ok(display_id)
    } else {
        Err(BootstrapError::UnknownDisplay(display_id))
    }
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode(key) == name).then(|| decode(value))
        })
        .next()
}

fn decode(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
