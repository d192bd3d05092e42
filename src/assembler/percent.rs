//! Percent-of-total pass and run-time footers.
//!
//! Entries of the merged root carry `(<runtime>s|<pctParent>%)`. This pass
//! rewrites them to `(<runtime>s|<pctTotal>%|<pctParent>%)`, recomputing the
//! total share from the runtime, so running it again gives the same bytes.

use crate::merge::render::{format_percent, format_secs};
use crate::parser::Micros;
use crate::utils::config::{FOOTER_PREFIX, PERCENT_SCALE};
use regex::Regex;
use std::sync::OnceLock;

fn entry_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<prefix>(?:\|   |\|-- )*)(?P<id>\d+(?:\.\d+)?): \((?P<secs>\d+)\.(?P<micros>\d{6})s\|(?:\d+\.\d{2}%\|)?(?P<parent>\d+\.\d{2})%\)(?P<rest>.*)$",
        )
        .expect("entry regex compiles")
    })
}

/// Runtime in µs of one rendered entry line, `None` for non-entries
pub fn entry_runtime(line: &str) -> Option<Micros> {
    let caps = entry_pattern().captures(line)?;
    let secs: Micros = caps["secs"].parse().ok()?;
    let micros: Micros = caps["micros"].parse().ok()?;
    Some(secs * 1_000_000 + micros)
}

/// Share of `total` in basis points, rounded to nearest
pub fn percent_of_total(runtime: Micros, total: Micros) -> u64 {
    if total == 0 {
        return 0;
    }
    let total = u128::from(total);
    ((u128::from(runtime) * u128::from(PERCENT_SCALE) + total / 2) / total) as u64
}

/// Rewrite every entry line with its percent of `total`
///
/// **Public** - idempotent; non-entry lines pass through untouched
pub fn add_percent_of_total<S: AsRef<str>>(lines: &[S], total: Micros) -> Vec<String> {
    lines
        .iter()
        .map(|line| {
            let line = line.as_ref();
            let Some(caps) = entry_pattern().captures(line) else {
                return line.to_string();
            };
            let runtime = entry_runtime(line).unwrap_or(0);
            format!(
                "{}{}: ({}.{}s|{}%|{}%){}",
                &caps["prefix"],
                &caps["id"],
                &caps["secs"],
                &caps["micros"],
                format_percent(percent_of_total(runtime, total)),
                &caps["parent"],
                &caps["rest"]
            )
        })
        .collect()
}

/// Drop any existing footer (and trailing blank lines), then append one
pub fn with_footer<S: AsRef<str>>(lines: &[S], total: Micros) -> Vec<String> {
    let mut out: Vec<String> = lines
        .iter()
        .map(|l| l.as_ref())
        .filter(|l| !l.starts_with(FOOTER_PREFIX))
        .map(str::to_string)
        .collect();
    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    out.push(format!("{}{}s", FOOTER_PREFIX, format_secs(total)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entry_runtime() {
        assert_eq!(entry_runtime("3: (1.000500s|28.57%)  (1|0.3)  x"), Some(1_000_500));
        assert_eq!(entry_runtime("|-- 2: (0.000500s|100.00%)  (1|0.2.1)  y"), Some(500));
        assert_eq!(entry_runtime("TOTAL RUN TIME: 0.003500s"), None);
    }

    #[test]
    fn test_percent_of_total_is_idempotent() {
        let lines = vec![
            "1: (0.001000s|28.57%)  (1|0.1)  echo a",
            "7: (0.000500s|14.29%)  (1|0.2|FUNCTION)  f",
            "|-- 2: (0.000500s|100.00%)  (1|0.2.1)  echo in",
        ];
        let once = add_percent_of_total(&lines, 3_500);
        assert_eq!(
            once,
            vec![
                "1: (0.001000s|28.57%|28.57%)  (1|0.1)  echo a",
                "7: (0.000500s|14.29%|14.29%)  (1|0.2|FUNCTION)  f",
                "|-- 2: (0.000500s|14.29%|100.00%)  (1|0.2.1)  echo in",
            ]
        );
        let twice = add_percent_of_total(&once, 3_500);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_footer_is_replaced_not_duplicated() {
        let lines = with_footer(&["1: a", ""], 3_500);
        assert_eq!(lines, vec!["1: a", "TOTAL RUN TIME: 0.003500s"]);
        assert_eq!(with_footer(&lines, 3_500), lines);
    }
}
