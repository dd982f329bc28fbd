//! ISO-8601 durations (`PT30S`, `PT4M`, `P1DT2H`) used for lock hold times.

use chrono::TimeDelta;
use leasehold_core::{AppError, AppResult};

const NANOS_PER_SECOND: i128 = 1_000_000_000;
const NANOS_PER_MINUTE: i128 = 60 * NANOS_PER_SECOND;
const NANOS_PER_HOUR: i128 = 60 * NANOS_PER_MINUTE;
const NANOS_PER_DAY: i128 = 24 * NANOS_PER_HOUR;

const DATE_UNITS: &[(char, i128)] = &[('D', NANOS_PER_DAY)];
const TIME_UNITS: &[(char, i128)] = &[
    ('H', NANOS_PER_HOUR),
    ('M', NANOS_PER_MINUTE),
    ('S', NANOS_PER_SECOND),
];

/// Parses a non-negative ISO-8601 duration of the form `PnDTnHnMn.nS`.
pub fn parse_iso8601_duration(input: &str) -> AppResult<TimeDelta> {
    let normalized = input.trim().to_ascii_uppercase();
    let Some(body) = normalized.strip_prefix('P') else {
        return Err(invalid_duration(input));
    };

    let (date_part, time_part) = match body.split_once('T') {
        Some((_, "")) => return Err(invalid_duration(input)),
        Some((date_part, time_part)) => (date_part, time_part),
        None => (body, ""),
    };

    if date_part.is_empty() && time_part.is_empty() {
        return Err(invalid_duration(input));
    }

    let total_nanos = parse_components(date_part, DATE_UNITS, input)?
        .checked_add(parse_components(time_part, TIME_UNITS, input)?)
        .ok_or_else(|| invalid_duration(input))?;

    let total_nanos = i64::try_from(total_nanos).map_err(|_| {
        AppError::Validation(format!("ISO-8601 duration '{input}' is out of range"))
    })?;

    Ok(TimeDelta::nanoseconds(total_nanos))
}

/// Formats a duration as ISO-8601 with hour, minute and second components.
#[must_use]
pub fn format_iso8601_duration(duration: TimeDelta) -> String {
    if duration.is_zero() {
        return "PT0S".to_owned();
    }

    let sign = if duration < TimeDelta::zero() { "-" } else { "" };
    let duration = duration.abs();
    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;
    let seconds = duration.num_seconds() % 60;
    let millis = duration.subsec_nanos() / 1_000_000;

    let mut formatted = format!("{sign}PT");
    if hours > 0 {
        formatted.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        formatted.push_str(&format!("{minutes}M"));
    }
    if millis > 0 {
        formatted.push_str(&format!("{seconds}.{millis:03}S"));
    } else if seconds > 0 {
        formatted.push_str(&format!("{seconds}S"));
    }

    formatted
}

fn parse_components(part: &str, units: &[(char, i128)], input: &str) -> AppResult<i128> {
    let mut total = 0_i128;
    let mut number = String::new();
    let mut next_unit = 0;

    for character in part.chars() {
        if character.is_ascii_digit() || character == '.' {
            number.push(character);
            continue;
        }

        // Units must appear once each, in descending order.
        let position = units
            .iter()
            .position(|(unit, _)| *unit == character)
            .filter(|position| *position >= next_unit)
            .ok_or_else(|| invalid_duration(input))?;
        let (unit, nanos_per_unit) = units[position];

        let nanos = parse_number(number.as_str(), nanos_per_unit, unit == 'S')
            .ok_or_else(|| invalid_duration(input))?;
        total = total
            .checked_add(nanos)
            .ok_or_else(|| invalid_duration(input))?;

        number.clear();
        next_unit = position + 1;
    }

    if !number.is_empty() {
        return Err(invalid_duration(input));
    }

    Ok(total)
}

fn parse_number(number: &str, nanos_per_unit: i128, allow_fraction: bool) -> Option<i128> {
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) if allow_fraction => (whole, Some(fraction)),
        Some(_) => return None,
        None => (number, None),
    };

    if whole.is_empty() || !whole.chars().all(|character| character.is_ascii_digit()) {
        return None;
    }

    let whole_nanos = whole.parse::<i128>().ok()?.checked_mul(nanos_per_unit)?;
    let Some(fraction) = fraction else {
        return Some(whole_nanos);
    };

    if fraction.is_empty()
        || fraction.len() > 9
        || !fraction.chars().all(|character| character.is_ascii_digit())
    {
        return None;
    }

    let fraction_nanos = format!("{fraction:0<9}").parse::<i128>().ok()?;
    whole_nanos.checked_add(fraction_nanos)
}

fn invalid_duration(input: &str) -> AppError {
    AppError::Validation(format!(
        "invalid ISO-8601 duration '{input}', expected a value such as PT30S or PT4M"
    ))
}
