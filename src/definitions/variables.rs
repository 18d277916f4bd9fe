//! Calendar variables in definition parameters.
//!
//! A value such as `$day:-1` or `${monthLastDay:-1:yyyyMMdd}` is replaced at
//! load time by a value computed from the current date. Plain values pass
//! through unchanged.

use std::fmt::Write;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::error::{CoordinatorError, Result};

const DEFAULT_DATE_FORMAT: &str = "yyyy-MM-dd";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Variable<'a> {
    name: &'a str,
    offset: i64,
    format: Option<&'a str>,
}

pub fn is_variable(value: &str) -> bool {
    let value = value.trim();
    value.len() > 1 && value.starts_with('$')
}

fn parse(value: &str) -> Option<Variable<'_>> {
    if !is_variable(value) {
        return None;
    }
    let body = &value.trim()[1..];
    let body = body
        .strip_prefix('{')
        .and_then(|b| b.strip_suffix('}'))
        .unwrap_or(body);
    let mut parts = body.splitn(3, ':');
    let name = parts.next().unwrap_or_default().trim();
    let offset = parts
        .next()
        .and_then(|o| o.trim().parse().ok())
        .unwrap_or(0);
    let format = parts.next().filter(|f| !f.is_empty());
    Some(Variable {
        name,
        offset,
        format,
    })
}

/// Resolve `value` against `now`, returning it unchanged if it is not a
/// variable.
pub fn resolve(value: &str, now: NaiveDateTime) -> Result<String> {
    let Some(var) = parse(value) else {
        return Ok(value.to_string());
    };

    let special = match var.name {
        "weekMonday" => Some(week_monday(now.date(), var.offset)),
        "weekSunday" => Some(week_monday(now.date(), var.offset).map(|d| d + Duration::days(6))),
        "monthFirstDay" => Some(month_first_day(now.date(), var.offset)),
        "monthLastDay" => Some(month_last_day(now.date(), var.offset)),
        _ => None,
    };
    if let Some(date) = special {
        let date = date.ok_or_else(|| out_of_range(value))?;
        let format = var.format.unwrap_or(DEFAULT_DATE_FORMAT);
        // Time fields of a special date render as midnight
        return format_with(date.and_time(NaiveTime::MIN), format, value);
    }

    let shifted = shift_field(now, var.name, var.offset)?.ok_or_else(|| out_of_range(value))?;
    if let Some(format) = var.format {
        return format_with(shifted, format, value);
    }
    let field = match var.name {
        "year" => shifted.year() as i64,
        "month" => shifted.month() as i64,
        "day" => shifted.day() as i64,
        "hour" => shifted.hour() as i64,
        "minute" => shifted.minute() as i64,
        "week" => shifted.iso_week().week() as i64,
        other => return Err(CoordinatorError::UnknownVariable(other.to_string())),
    };
    Ok(field.to_string())
}

fn format_with(at: NaiveDateTime, pattern: &str, value: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", at.format(&to_chrono_format(pattern))).map_err(|_| {
        CoordinatorError::InvalidDefinition(format!("variable [{}] has an invalid format", value))
    })?;
    Ok(out)
}

fn out_of_range(value: &str) -> CoordinatorError {
    CoordinatorError::InvalidDefinition(format!("variable [{}] is out of range", value))
}

fn shift_months(now: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let amount = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        now.checked_add_months(amount)
    } else {
        now.checked_sub_months(amount)
    }
}

fn shift_field(now: NaiveDateTime, name: &str, offset: i64) -> Result<Option<NaiveDateTime>> {
    let shifted = match name {
        "year" => offset.checked_mul(12).and_then(|m| shift_months(now, m)),
        "month" => shift_months(now, offset),
        "day" => Duration::try_days(offset).and_then(|d| now.checked_add_signed(d)),
        "hour" => Duration::try_hours(offset).and_then(|d| now.checked_add_signed(d)),
        "minute" => Duration::try_minutes(offset).and_then(|d| now.checked_add_signed(d)),
        "week" => Duration::try_weeks(offset).and_then(|d| now.checked_add_signed(d)),
        other => return Err(CoordinatorError::UnknownVariable(other.to_string())),
    };
    Ok(shifted)
}

fn week_monday(today: NaiveDate, offset: i64) -> Option<NaiveDate> {
    let day = today.checked_add_signed(Duration::try_weeks(offset)?)?;
    day.checked_sub_signed(Duration::days(day.weekday().num_days_from_monday() as i64))
}

fn month_first_day(today: NaiveDate, offset: i64) -> Option<NaiveDate> {
    let first = today.with_day(1)?;
    let amount = Months::new(u32::try_from(offset.unsigned_abs()).ok()?);
    if offset >= 0 {
        first.checked_add_months(amount)
    } else {
        first.checked_sub_months(amount)
    }
}

fn month_last_day(today: NaiveDate, offset: i64) -> Option<NaiveDate> {
    let next_first = month_first_day(today, offset.checked_add(1)?)?;
    next_first.pred_opt()
}

/// Translate a `yyyy-MM-dd HH:mm:ss` style pattern into a chrono format
/// string. Unrecognised characters are kept literally.
pub fn to_chrono_format(pattern: &str) -> String {
    const TOKENS: [(&str, &str); 7] = [
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("MM", "%m"),
        ("dd", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
    ];
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (token, replacement) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }
    out
}
