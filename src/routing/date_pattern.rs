//! Date-rolling index name formatting.
//!
//! Templates look like `orders-{0:yyyy.MM.dd}`: a literal prefix, a `{0:...}`
//! placeholder carrying a .NET-style date format, and an optional literal
//! suffix. A template with no `{` is constant and never reaches this module
//! at all (see `RoutingStrategy::is_constant`).

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{0:([^}]+)\}").unwrap())
}

/// Translate the .NET-style tokens this system's templates use into `chrono`
/// strftime directives. Unknown characters pass through unchanged (they are
/// almost always separators like `.` or `-`).
fn to_strftime(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        let mut run = String::new();
        run.push(c);
        while chars.peek() == Some(&c) {
            run.push(chars.next().unwrap());
        }
        let token = match (c, run.len()) {
            ('y', 4) => "%Y",
            ('y', 2) => "%y",
            ('M', 2) => "%m",
            ('d', 2) => "%d",
            ('H', 2) => "%H",
            ('m', 2) => "%M",
            ('s', 2) => "%S",
            _ => {
                out.push_str(&run);
                continue;
            }
        };
        out.push_str(token);
    }
    out
}

/// Expand a template like `orders-{0:yyyy.MM.dd}` against `timestamp`.
///
/// Panics never: a malformed placeholder is left verbatim in the output,
/// which will simply fail as an invalid index name server-side, reported
/// back through `ExportOutcome::Rejected` like any other bad document.
pub fn format_index_template(template: &str, timestamp: DateTime<Utc>) -> String {
    let re = placeholder_re();
    if let Some(caps) = re.captures(template) {
        let whole = caps.get(0).unwrap();
        let date_pattern = &caps[1];
        let strftime = to_strftime(date_pattern);
        let formatted = timestamp.format(&strftime).to_string();
        let mut out = String::with_capacity(template.len());
        out.push_str(&template[..whole.start()]);
        out.push_str(&formatted);
        out.push_str(&template[whole.end()..]);
        out
    } else {
        template.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expands_date_rolling_template() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert_eq!(
            format_index_template("orders-{0:yyyy.MM.dd}", ts),
            "orders-2024.06.15"
        );
    }

    #[test]
    fn constant_template_passes_through() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap();
        assert_eq!(format_index_template("orders-v1", ts), "orders-v1");
    }
}
