//! Turns value tokens into operands and operands into concrete values.
//!
//! Classification happens at parse time, evaluation at execution time: a
//! function reference such as `currentUser()` or `-7d` stays unevaluated in the
//! structured query and is resolved against an [`ExecutionContext`] on every
//! execution.
//!
//! Calendar rules: weeks start on Monday (ISO 8601), month and year offsets use
//! calendar arithmetic clamped to the last day of the month, and every `endOf*`
//! function returns the last millisecond of its period. All times are UTC.

use crate::ast::{DateOffset, Function, FunctionRef, Literal, OffsetUnit, Operand};
use crate::token::{Token, TokenKind};
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-request state that deferred functions are resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub current_user_id: String,
    pub now: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(current_user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            current_user_id: current_user_id.into(),
            now,
        }
    }

    /// Context anchored on the wall clock.
    pub fn for_user(current_user_id: impl Into<String>) -> Self {
        Self::new(current_user_id, Utc::now())
    }
}

/// A resolved, concrete value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Null,
    Empty,
}

impl Value {
    /// Text form used for substring matching.
    pub fn as_text(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Integer(n) => n.to_string(),
            Value::Float(n) => n.to_string(),
            Value::Timestamp(t) => t.to_rfc3339(),
            Value::Null | Value::Empty => String::new(),
        }
    }
}

impl Operand {
    /// Classifies a value token. Quoted strings always stay text.
    pub fn from_token(token: &Token<'_>) -> Operand {
        match token.kind {
            TokenKind::Literal { quoted: true } => {
                Operand::Literal(Literal::Text(token.text.to_string()))
            }
            TokenKind::FunctionCall => match parse_function_call(token.text) {
                Some(function) => Operand::Function(function),
                None => Operand::Literal(Literal::Text(token.text.to_string())),
            },
            _ => classify_bare_word(token.text),
        }
    }
}

fn classify_bare_word(word: &str) -> Operand {
    if let Some(offset) = DateOffset::parse(word) {
        return Operand::Function(FunctionRef::new(Function::Offset(offset)));
    }
    if word.eq_ignore_ascii_case("NULL") {
        return Operand::Literal(Literal::Null);
    }
    if word.eq_ignore_ascii_case("EMPTY") {
        return Operand::Literal(Literal::Empty);
    }
    if let Ok(n) = word.parse::<i64>() {
        return Operand::Literal(Literal::Integer(n));
    }
    let numeric = word
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'));
    if numeric {
        if let Ok(n) = word.parse::<f64>() {
            return Operand::Literal(Literal::Float(n));
        }
    }
    Operand::Literal(Literal::Text(word.to_string()))
}

/// Parses `name(arg, ...)`. Unknown function names yield `None`.
fn parse_function_call(text: &str) -> Option<FunctionRef> {
    let open = text.find('(')?;
    let inner = text[open + 1..].strip_suffix(')')?;
    let function = Function::from_name(text[..open].trim())?;
    let args = inner
        .split(',')
        .map(|arg| arg.trim().trim_matches('"').to_string())
        .filter(|arg| !arg.is_empty())
        .collect();
    Some(FunctionRef { function, args })
}

/// Resolves a value token against the execution context.
pub fn resolve_value(token: &Token<'_>, context: &ExecutionContext) -> Value {
    resolve(&Operand::from_token(token), context)
}

/// Resolves an operand against the execution context.
pub fn resolve(operand: &Operand, context: &ExecutionContext) -> Value {
    match operand {
        Operand::Literal(literal) => match literal {
            Literal::Text(s) => Value::Text(s.clone()),
            Literal::Integer(n) => Value::Integer(*n),
            Literal::Float(n) => Value::Float(*n),
            Literal::Null => Value::Null,
            Literal::Empty => Value::Empty,
        },
        Operand::Function(function) => resolve_function(function, context),
    }
}

fn resolve_function(function: &FunctionRef, context: &ExecutionContext) -> Value {
    let resolved = match function.function {
        Function::CurrentUser => return Value::Text(context.current_user_id.clone()),
        Function::Now => Some(context.now),
        Function::Offset(offset) => apply_offset(context.now, offset),
        boundary => {
            // An optional relative offset shifts the anchor, e.g. `startOfDay(-1d)`.
            let anchor = match function.args.first().and_then(|arg| DateOffset::parse(arg)) {
                Some(offset) => apply_offset(context.now, offset),
                None => Some(context.now),
            };
            anchor.and_then(|anchor| period_boundary(boundary, anchor))
        }
    };

    match resolved {
        Some(timestamp) => Value::Timestamp(timestamp),
        None => {
            warn!(
                %function,
                now = %context.now,
                "date arithmetic out of range, using literal text"
            );
            Value::Text(function.to_string())
        }
    }
}

/// Shifts `now` by a relative offset using calendar-aware arithmetic.
pub fn apply_offset(now: DateTime<Utc>, offset: DateOffset) -> Option<DateTime<Utc>> {
    match offset.unit {
        OffsetUnit::Day => now.checked_add_signed(TimeDelta::try_days(offset.amount)?),
        OffsetUnit::Week => now.checked_add_signed(TimeDelta::try_weeks(offset.amount)?),
        OffsetUnit::Month => add_months(now, offset.amount),
        OffsetUnit::Year => add_months(now, offset.amount.checked_mul(12)?),
    }
}

fn add_months(now: DateTime<Utc>, months: i64) -> Option<DateTime<Utc>> {
    let count = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        now.checked_add_months(count)
    } else {
        now.checked_sub_months(count)
    }
}

fn period_boundary(function: Function, anchor: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let day = anchor.date_naive();
    match function {
        Function::StartOfDay => midnight(day),
        Function::EndOfDay => last_instant_before(day.checked_add_days(Days::new(1))?),
        Function::StartOfWeek => midnight(start_of_week(day)?),
        Function::EndOfWeek => {
            last_instant_before(start_of_week(day)?.checked_add_days(Days::new(7))?)
        }
        Function::StartOfMonth => midnight(day.with_day(1)?),
        Function::EndOfMonth => {
            last_instant_before(day.with_day(1)?.checked_add_months(Months::new(1))?)
        }
        _ => None,
    }
}

fn start_of_week(day: NaiveDate) -> Option<NaiveDate> {
    let since_monday = day.weekday().num_days_from_monday();
    day.checked_sub_days(Days::new(u64::from(since_monday)))
}

fn midnight(day: NaiveDate) -> Option<DateTime<Utc>> {
    Some(Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0)?))
}

/// Last millisecond before midnight of `next`.
fn last_instant_before(next: NaiveDate) -> Option<DateTime<Utc>> {
    midnight(next)?.checked_sub_signed(TimeDelta::try_milliseconds(1)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn context(now: DateTime<Utc>) -> ExecutionContext {
        ExecutionContext::new("alice", now)
    }

    fn resolve_text(input: &str, context: &ExecutionContext) -> Value {
        let tokens = tokenize(input);
        resolve_value(&tokens[0], context)
    }

    #[test]
    fn test_relative_days() {
        let ctx = context(at(2024, 3, 15, 0, 0, 0));
        assert_eq!(resolve_text("-7d", &ctx), Value::Timestamp(at(2024, 3, 8, 0, 0, 0)));
        assert_eq!(resolve_text("+2w", &ctx), Value::Timestamp(at(2024, 3, 29, 0, 0, 0)));
    }

    #[test]
    fn test_relative_month_clamps_to_leap_day() {
        let ctx = context(at(2024, 1, 31, 0, 0, 0));
        assert_eq!(resolve_text("+1m", &ctx), Value::Timestamp(at(2024, 2, 29, 0, 0, 0)));
        assert_eq!(resolve_text("-1m", &ctx), Value::Timestamp(at(2023, 12, 31, 0, 0, 0)));
    }

    #[test]
    fn test_relative_year_from_leap_day() {
        let ctx = context(at(2024, 2, 29, 12, 0, 0));
        assert_eq!(resolve_text("1y", &ctx), Value::Timestamp(at(2025, 2, 28, 12, 0, 0)));
    }

    #[test]
    fn test_day_boundaries() {
        let ctx = context(at(2024, 3, 15, 13, 45, 10));
        assert_eq!(resolve_text("startOfDay()", &ctx), Value::Timestamp(at(2024, 3, 15, 0, 0, 0)));
        let end = at(2024, 3, 16, 0, 0, 0) - TimeDelta::try_milliseconds(1).unwrap();
        assert_eq!(resolve_text("endOfDay()", &ctx), Value::Timestamp(end));
    }

    #[test]
    fn test_week_boundaries_start_on_monday() {
        // 2024-03-15 is a Friday
        let ctx = context(at(2024, 3, 15, 13, 0, 0));
        assert_eq!(resolve_text("startOfWeek()", &ctx), Value::Timestamp(at(2024, 3, 11, 0, 0, 0)));
        let end = at(2024, 3, 18, 0, 0, 0) - TimeDelta::try_milliseconds(1).unwrap();
        assert_eq!(resolve_text("endOfWeek()", &ctx), Value::Timestamp(end));

        // a Monday is its own week start
        let monday = context(at(2024, 3, 11, 9, 0, 0));
        assert_eq!(
            resolve_text("startOfWeek()", &monday),
            Value::Timestamp(at(2024, 3, 11, 0, 0, 0))
        );
    }

    #[test]
    fn test_month_boundaries_use_real_month_length() {
        let ctx = context(at(2024, 2, 10, 8, 0, 0));
        assert_eq!(resolve_text("startOfMonth()", &ctx), Value::Timestamp(at(2024, 2, 1, 0, 0, 0)));
        let end = at(2024, 3, 1, 0, 0, 0) - TimeDelta::try_milliseconds(1).unwrap();
        assert_eq!(resolve_text("endOfMonth()", &ctx), Value::Timestamp(end));
    }

    #[test]
    fn test_boundary_with_offset_argument() {
        let ctx = context(at(2024, 3, 15, 13, 0, 0));
        assert_eq!(
            resolve_text(r#"startOfDay("-1d")"#, &ctx),
            Value::Timestamp(at(2024, 3, 14, 0, 0, 0))
        );
        assert_eq!(
            resolve_text("startOfMonth(+1m)", &ctx),
            Value::Timestamp(at(2024, 4, 1, 0, 0, 0))
        );
    }

    #[test]
    fn test_current_user_and_now() {
        let now = at(2024, 3, 15, 0, 0, 0);
        assert_eq!(resolve_text("currentUser()", &context(now)), Value::Text("alice".to_string()));
        assert_eq!(
            resolve_text("currentUser()", &ExecutionContext::new("bob", now)),
            Value::Text("bob".to_string())
        );
        assert_eq!(resolve_text("NOW()", &context(now)), Value::Timestamp(now));
    }

    #[test]
    fn test_plain_literals() {
        let ctx = context(at(2024, 3, 15, 0, 0, 0));
        assert_eq!(resolve_text("42", &ctx), Value::Integer(42));
        assert_eq!(resolve_text("2.5", &ctx), Value::Float(2.5));
        assert_eq!(resolve_text(r#""42""#, &ctx), Value::Text("42".to_string()));
        assert_eq!(resolve_text(r#""-7d""#, &ctx), Value::Text("-7d".to_string()));
        assert_eq!(resolve_text("Done", &ctx), Value::Text("Done".to_string()));
        assert_eq!(resolve_text("nan", &ctx), Value::Text("nan".to_string()));
        assert_eq!(resolve_text("null", &ctx), Value::Null);
        assert_eq!(resolve_text("EMPTY", &ctx), Value::Empty);
    }

    #[test]
    fn test_unknown_function_stays_text() {
        let ctx = context(at(2024, 3, 15, 0, 0, 0));
        assert_eq!(
            resolve_text("membersOf(devs)", &ctx),
            Value::Text("membersOf(devs)".to_string())
        );
    }

    #[test]
    fn test_classification_is_deferred() {
        let tokens = tokenize("currentUser()");
        assert_eq!(
            Operand::from_token(&tokens[0]),
            Operand::Function(FunctionRef::new(Function::CurrentUser))
        );
    }

    #[test]
    fn test_out_of_range_offset_falls_back_to_text() {
        let ctx = context(at(2024, 3, 15, 0, 0, 0));
        assert_eq!(
            resolve_text("+9999999999y", &ctx),
            Value::Text("+9999999999y".to_string())
        );
    }
}
