//! Parsing of single prompt answers.
//!
//! Every parser returns a [`Prompt`]: a value, a cancellation (`q`), or a
//! reason the answer was not accepted so the question can be asked again.
//! An empty answer means "keep the default" wherever a default exists.

use crate::model::validate_amount;

/// Answer that cancels the current command.
pub const CANCEL: &str = "q";

/// Outcome of reading one answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt<T> {
    Value(T),
    Cancelled,
    Invalid(String),
}

impl<T> Prompt<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Prompt<U> {
        match self {
            Prompt::Value(value) => Prompt::Value(f(value)),
            Prompt::Cancelled => Prompt::Cancelled,
            Prompt::Invalid(reason) => Prompt::Invalid(reason),
        }
    }
}

/// Raw answer after trimming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer<'a> {
    Cancel,
    Empty,
    Text(&'a str),
}

pub fn classify(raw: &str) -> Answer<'_> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case(CANCEL) {
        Answer::Cancel
    } else if trimmed.is_empty() {
        Answer::Empty
    } else {
        Answer::Text(trimmed)
    }
}

/// Required free text.
pub fn parse_text(raw: &str) -> Prompt<String> {
    match classify(raw) {
        Answer::Cancel => Prompt::Cancelled,
        Answer::Empty => Prompt::Invalid("A value is required.".into()),
        Answer::Text(text) => Prompt::Value(text.to_string()),
    }
}

/// Free text where an empty answer keeps `default`.
pub fn parse_text_or(raw: &str, default: &str) -> Prompt<String> {
    match classify(raw) {
        Answer::Cancel => Prompt::Cancelled,
        Answer::Empty => Prompt::Value(default.to_string()),
        Answer::Text(text) => Prompt::Value(text.to_string()),
    }
}

/// Quantity or unit price; an empty answer keeps `default` when there is one.
pub fn parse_amount(raw: &str, default: Option<f64>) -> Prompt<f64> {
    match classify(raw) {
        Answer::Cancel => Prompt::Cancelled,
        Answer::Empty => match default {
            Some(value) => Prompt::Value(value),
            None => Prompt::Invalid("A number is required.".into()),
        },
        Answer::Text(text) => match parse_number(text) {
            Ok(value) => match validate_amount("value", value) {
                Ok(value) => Prompt::Value(value),
                Err(_) => Prompt::Invalid("Enter a number between 0 and 1,000,000.".into()),
            },
            Err(message) => Prompt::Invalid(message),
        },
    }
}

/// Any finite number, used for filter bounds.
pub fn parse_bound(raw: &str) -> Prompt<f64> {
    match classify(raw) {
        Answer::Cancel => Prompt::Cancelled,
        Answer::Empty => Prompt::Invalid("A number is required.".into()),
        Answer::Text(text) => parse_number(text).map_or_else(Prompt::Invalid, Prompt::Value),
    }
}

/// 1-based menu number, returned as a 0-based index below `len`.
pub fn parse_choice(raw: &str, len: usize) -> Prompt<usize> {
    match classify(raw) {
        Answer::Cancel => Prompt::Cancelled,
        Answer::Empty => Prompt::Invalid(format!("Enter a number from 1 to {len}.")),
        Answer::Text(text) => match text.parse::<usize>() {
            Ok(number) if (1..=len).contains(&number) => Prompt::Value(number - 1),
            _ => Prompt::Invalid(format!("Enter a number from 1 to {len}.")),
        },
    }
}

/// Either the number of one of `options` or a custom value. An empty answer
/// keeps `current` when there is one.
pub fn parse_pick_or_custom(raw: &str, options: &[String], current: Option<&str>) -> Prompt<String> {
    match classify(raw) {
        Answer::Cancel => Prompt::Cancelled,
        Answer::Empty => match current {
            Some(current) => Prompt::Value(current.to_string()),
            None => Prompt::Invalid("Pick a number or type a value.".into()),
        },
        Answer::Text(text) => match text.parse::<usize>() {
            Ok(number) if (1..=options.len()).contains(&number) => {
                Prompt::Value(options[number - 1].clone())
            }
            Ok(_) => Prompt::Invalid(format!(
                "Enter a number from 1 to {} or type a value.",
                options.len()
            )),
            Err(_) => Prompt::Value(text.to_string()),
        },
    }
}

/// Yes/no question. `q` counts as cancellation.
pub fn parse_confirmation(raw: &str) -> Prompt<bool> {
    match classify(raw) {
        Answer::Cancel => Prompt::Cancelled,
        Answer::Empty => Prompt::Invalid("Answer 'y' (yes), 'n' (no) or 'q' (cancel).".into()),
        Answer::Text(text) => match text.to_lowercase().as_str() {
            "y" | "yes" | "t" | "tak" => Prompt::Value(true),
            "n" | "no" | "nie" => Prompt::Value(false),
            _ => Prompt::Invalid("Answer 'y' (yes), 'n' (no) or 'q' (cancel).".into()),
        },
    }
}

// Accepts a decimal comma or a decimal point. Thousands separators are
// accepted only next to a decimal point, or when more than one group shows
// they cannot be a decimal comma.
fn parse_number(text: &str) -> std::result::Result<f64, String> {
    let not_a_number = || format!("'{text}' is not a number.");
    let normalized = match text.split_once('.') {
        Some((whole, fraction)) if whole.contains(',') => {
            let whole = strip_grouping(whole).ok_or_else(not_a_number)?;
            format!("{whole}.{fraction}")
        }
        Some(_) => text.to_string(),
        None => match strip_grouping(text) {
            Some(whole) if text.matches(',').count() > 1 => whole,
            Some(_) => {
                return Err(format!(
                    "'{text}' is ambiguous; write it without the comma or with a decimal point."
                ));
            }
            None => text.replace(',', "."),
        },
    };
    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(not_a_number)
}

// Removes commas from a grouped integer such as `12,345,678`. Returns `None`
// unless every group after the first has exactly three digits.
fn strip_grouping(whole: &str) -> Option<String> {
    let digits = whole.strip_prefix('-').unwrap_or(whole);
    let mut groups = digits.split(',');
    let lead = groups.next()?;
    let lead_ok = (1..=3).contains(&lead.len())
        && !lead.starts_with('0')
        && lead.bytes().all(|byte| byte.is_ascii_digit());
    let mut rest = groups.peekable();
    if !lead_ok || rest.peek().is_none() {
        return None;
    }
    rest.all(|group| group.len() == 3 && group.bytes().all(|byte| byte.is_ascii_digit()))
        .then(|| whole.replace(',', ""))
}
