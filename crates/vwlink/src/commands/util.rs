//! Shared helpers for command handlers.

use chrono::{DateTime, Utc};

use vwlink_core::{SubState, Unavailability};

/// Value of a sub-state, or why there is none.
pub fn sub_state<T>(state: &SubState<T>, show: impl Fn(&T) -> String) -> String {
    match state {
        SubState::Present(reading) => show(&reading.value),
        SubState::Unavailable {
            reason: Unavailability::OutOfRange { field, value },
            ..
        } => format!("unavailable ({field} = {value})"),
        SubState::AccessDenied { message, .. } => format!("access denied ({message})"),
        other => other.label().into(),
    }
}

/// Human-readable age of a timestamp, e.g. "42s ago".
pub fn since(at: Option<DateTime<Utc>>) -> String {
    let Some(at) = at else {
        return "-".into();
    };
    let secs = (Utc::now() - at).num_seconds().max(0);
    match secs {
        0..60 => format!("{secs}s ago"),
        60..3600 => format!("{}m ago", secs / 60),
        _ => format!("{}h ago", secs / 3600),
    }
}
