//! Text/pattern heuristics for the target page.
//!
//! Everything the agent infers from rendered text lives here as pure
//! functions: action-label matching, weekday inference from container
//! text, date-label derivation, desk extraction and confirmation-button
//! choice. All of it is best-effort and fail-open: layout changes on
//! the target site degrade matching, they must never panic.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// Labels that identify a bookable control. Compared against the
/// control's normalized text with exact, case-insensitive equality.
pub const ACTION_LABELS: &[&str] = &["schedule", "schedule desk", "book desk", "book", "reserve"];

/// Substrings that identify a dialog confirmation button.
pub const CONFIRM_KEYWORDS: &[&str] =
    &["confirm", "book", "schedule", "reserve", "yes", "submit", "ok"];

const WEEKDAY_NAMES: &[&str] = &[
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

static WEEKDAY_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(sunday|sun|monday|mon|tuesday|tues|tue|wednesday|wed|thursday|thurs|thur|thu|friday|fri|saturday|sat)\b",
    )
    .unwrap()
});

static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{1,2})\b")
        .unwrap()
});

static DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})(?:st|nd|rd|th)?\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\b",
    )
    .unwrap()
});

/// Month-first slash dates: 3/14, 3/14/2026.
static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{2,4}))?\b").unwrap());

/// Day-first dotted dates: 14.3., 14.3.2026.
static DOT_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{2,4})?").unwrap());

static ACTION_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(schedule|book|reserve|desk)\b").unwrap());

static DESK_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(desk|table|seat|spot|space)\s*[#:.]?\s*([A-Za-z0-9][A-Za-z0-9_-]*)\b")
        .unwrap()
});

/// Lowercase and collapse runs of whitespace.
pub fn normalize_label(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether a control's text marks it as a booking action.
pub fn is_action_label(text: &str) -> bool {
    let normalized = normalize_label(text);
    ACTION_LABELS.iter().any(|label| *label == normalized)
}

pub fn weekday_name(day: u8) -> &'static str {
    WEEKDAY_NAMES.get(day as usize).copied().unwrap_or("?")
}

/// Infer the weekday (0=Sunday..6=Saturday) a control belongs to from
/// its container text. Tries a weekday token first, then month+day and
/// numeric date patterns resolved against `today`'s year. Returns None
/// when nothing matches; callers treat that as "keep" (fail-open).
pub fn weekday_from_text(text: &str, today: NaiveDate) -> Option<u8> {
    if let Some(caps) = WEEKDAY_TOKEN.captures(text) {
        let token = caps[1].to_lowercase();
        let day = match &token[..3.min(token.len())] {
            "sun" => 0,
            "mon" => 1,
            "tue" => 2,
            "wed" => 3,
            "thu" => 4,
            "fri" => 5,
            "sat" => 6,
            _ => return None,
        };
        return Some(day);
    }

    if let Some((month, day)) = parse_month_day(text) {
        return weekday_of(today.year(), month, day);
    }

    if let Some(caps) = SLASH_DATE.captures(text) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .map(normalize_year)
            .unwrap_or_else(|| today.year());
        return weekday_of(year, month, day);
    }

    if let Some(caps) = DOT_DATE.captures(text) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<i32>().ok())
            .map(normalize_year)
            .unwrap_or_else(|| today.year());
        return weekday_of(year, month, day);
    }

    None
}

fn parse_month_day(text: &str) -> Option<(u32, u32)> {
    if let Some(caps) = MONTH_DAY.captures(text) {
        let month = month_index(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        return Some((month, day));
    }
    if let Some(caps) = DAY_MONTH.captures(text) {
        let day: u32 = caps[1].parse().ok()?;
        let month = month_index(&caps[2])?;
        return Some((month, day));
    }
    None
}

fn month_index(token: &str) -> Option<u32> {
    const MONTHS: &[&str] = &[
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let token = token.to_lowercase();
    MONTHS
        .iter()
        .position(|m| token.starts_with(m))
        .map(|i| i as u32 + 1)
}

fn normalize_year(year: i32) -> i32 {
    if year < 100 {
        2000 + year
    } else {
        year
    }
}

fn weekday_of(year: i32, month: u32, day: u32) -> Option<u8> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.weekday().num_days_from_sunday() as u8)
}

/// Derive a short date label for reporting: the container text with the
/// action-label words removed, whitespace collapsed, truncated to 40
/// characters.
pub fn date_label(container_text: &str) -> String {
    let stripped = ACTION_WORDS.replace_all(container_text, " ");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(40).collect()
}

/// Best-effort desk identifier from container text after booking, e.g.
/// "Desk 42". None when no `(desk|table|seat|spot|space) <token>` pair
/// appears.
pub fn desk_label(text: &str) -> Option<String> {
    let caps = DESK_TOKEN.captures(text)?;
    let kind = &caps[1];
    let mut kind_cased = kind[..1].to_uppercase();
    kind_cased.push_str(&kind[1..].to_lowercase());
    Some(format!("{} {}", kind_cased, &caps[2]))
}

/// Pick the dialog button to confirm with: the first whose text contains
/// a confirmation keyword (case-insensitive substring), else the sole
/// button when exactly one exists. None means nothing safe to click.
pub fn choose_confirm_index(button_texts: &[&str]) -> Option<usize> {
    for (i, text) in button_texts.iter().enumerate() {
        let lower = text.to_lowercase();
        if CONFIRM_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            return Some(i);
        }
    }
    if button_texts.len() == 1 {
        return Some(0);
    }
    None
}
