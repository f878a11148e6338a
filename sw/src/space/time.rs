//! Minutes-since-midnight helpers for time-range parameters

use tracing::debug;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Parse "HHMM", "HH:MM", or an unpadded "930" / "9:30" into minutes since midnight
pub fn parse_hhmm(text: &str) -> Option<u32> {
    let text = text.trim();
    let (hours, minutes) = match text.split_once(':') {
        Some((h, m)) if (1..=2).contains(&h.len()) && (1..=2).contains(&m.len()) => (h, m),
        Some(_) => {
            debug!(%text, "parse_hhmm: rejected");
            return None;
        }
        None if (1..=4).contains(&text.len()) => {
            let split = text.len().saturating_sub(2);
            (text.get(..split).filter(|h| !h.is_empty()).unwrap_or("0"), text.get(split..)?)
        }
        None => {
            debug!(%text, "parse_hhmm: rejected");
            return None;
        }
    };
    if !hours.chars().chain(minutes.chars()).all(|c| c.is_ascii_digit()) {
        debug!(%text, "parse_hhmm: rejected");
        return None;
    }

    let hours: u32 = hours.parse().ok()?;
    let minutes: u32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        debug!(%text, hours, minutes, "parse_hhmm: out of range");
        return None;
    }
    Some(hours * 60 + minutes)
}

/// Format minutes since midnight as zero-padded "HHMM"
pub fn format_hhmm(minutes: u32) -> String {
    format!("{:02}{:02}", minutes / 60, minutes % 60)
}

/// Candidate times from..=to stepping by increment minutes
pub fn time_candidates(from: u32, to: u32, increment: u32) -> Vec<u32> {
    if increment == 0 || from > to {
        debug!(from, to, increment, "time_candidates: empty window");
        return Vec::new();
    }
    (from..=to.min(MINUTES_PER_DAY - 1)).step_by(increment as usize).collect()
}

/// Parse a "HHMM-HHMM" window, requiring start strictly before end
pub fn parse_window(text: &str) -> Option<(u32, u32)> {
    let (start, end) = text.trim().split_once('-')?;
    let start = parse_hhmm(start)?;
    let end = parse_hhmm(end)?;
    (start < end).then_some((start, end))
}

/// Format a window as "HHMM-HHMM"
pub fn format_window(start: u32, end: u32) -> String {
    format!("{}-{}", format_hhmm(start), format_hhmm(end))
}
