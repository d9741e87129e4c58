//! Rendering of statements, arguments and timings for log records.

use regex::{Captures, Regex};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::InstrumentationError;
use crate::types::Value;

/// Argument renderings longer than this are elided in the middle.
const MAX_ARG_WIDTH: usize = 50;
const ELIDED_KEEP: usize = 20;

static PLACEHOLDER: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();

fn placeholder_pattern() -> Result<&'static Regex, InstrumentationError> {
    PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$(\d+)"))
        .as_ref()
        .map_err(|err| InstrumentationError(err.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Execute,
    Prepare,
    FetchAll,
    FetchOne,
    FetchScalar,
    Cursor,
}

impl Operation {
    /// Lead of the record logged before the statement runs.
    pub fn verb(self) -> &'static str {
        match self {
            Operation::Execute => "Executing",
            Operation::Prepare => "Preparing",
            Operation::FetchAll => "Fetching rows",
            Operation::FetchOne => "Fetching row",
            Operation::FetchScalar => "Fetching scalar",
            Operation::Cursor => "Opening cursor",
        }
    }

    /// Summary of a completed call. `fetched` is the number of rows the
    /// call produced, when that is meaningful.
    pub fn timing_message(self, fetched: Option<usize>, elapsed: Duration) -> String {
        let elapsed = format_elapsed(elapsed);
        match self {
            Operation::Execute => format!("Execution took {}", elapsed),
            Operation::Prepare => format!("Preparation took {}", elapsed),
            Operation::FetchAll => format!("Fetched {} records in {}", fetched.unwrap_or(0), elapsed),
            Operation::FetchOne => {
                let what = if fetched == Some(1) {
                    "one record"
                } else {
                    "no records"
                };
                format!("Fetched {} in {}", what, elapsed)
            }
            Operation::FetchScalar => format!("Fetched value in {}", elapsed),
            Operation::Cursor => format!("Cursor opened in {}", elapsed),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Execute => "execute",
            Operation::Prepare => "prepare",
            Operation::FetchAll => "fetch_all",
            Operation::FetchOne => "fetch_one",
            Operation::FetchScalar => "fetch_scalar",
            Operation::Cursor => "cursor",
        };
        f.write_str(name)
    }
}

/// Human readable rendering of an argument, elided when too long.
pub fn format_arg(arg: &Value) -> String {
    let rendered = arg.sql_literal();
    let chars: Vec<char> = rendered.chars().collect();
    if chars.len() <= MAX_ARG_WIDTH {
        return rendered;
    }
    let head: String = chars[..ELIDED_KEEP].iter().collect();
    let tail: String = chars[chars.len() - ELIDED_KEEP..].iter().collect();
    format!("{} … {}", head, tail)
}

/// Elapsed time with three significant digits and the largest fitting unit.
pub fn format_elapsed(elapsed: Duration) -> String {
    const SCALES: [(f64, &str); 4] = [(1.0, "sec"), (1e-3, "msec"), (1e-6, "usec"), (1e-9, "nsec")];

    // Rounding first keeps 999.9 usec from printing as "1000 usec".
    let secs = elapsed.as_secs_f64();
    let secs = significant(secs, 3).parse().unwrap_or(secs);
    let (scale, unit) = SCALES
        .iter()
        .find(|(scale, _)| secs >= *scale)
        .copied()
        .unwrap_or(SCALES[3]);
    format!("{} {}", significant(secs / scale, 3), unit)
}

fn significant(x: f64, digits: i32) -> String {
    if x == 0.0 || !x.is_finite() {
        return format!("{}", x);
    }
    let magnitude = x.abs().log10().floor() as i32 + 1;
    let decimals = (digits - magnitude).max(0) as usize;
    let s = format!("{:.*}", decimals, x);
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}

/// Replace every `$N` placeholder with the rendering of the N-th argument.
pub fn substitute_args(sql: &str, args: &[Value]) -> Result<String, InstrumentationError> {
    if args.is_empty() {
        return Ok(sql.to_string());
    }
    let pattern = placeholder_pattern()?;
    let mut unmatched = None;
    let rendered = pattern.replace_all(sql, |caps: &Captures| {
        let arg = caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| args.get(index));
        match arg {
            Some(arg) => format_arg(arg),
            None => {
                unmatched.get_or_insert_with(|| caps[0].to_string());
                caps[0].to_string()
            }
        }
    });
    if let Some(placeholder) = unmatched {
        return Err(InstrumentationError(format!(
            "no argument for placeholder {} among {}",
            placeholder,
            args.len()
        )));
    }
    Ok(rendered.into_owned())
}

/// Indent every non blank line by four spaces.
pub fn indent(sql: &str) -> String {
    sql.lines()
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("    {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
