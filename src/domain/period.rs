// Time period recognition for column headers and chronological ordering
use chrono::NaiveDate;
use regex::{Captures, Regex};
use std::cmp::Ordering;
use std::sync::LazyLock;

/// How many leading values are inspected when classifying a field.
pub const SAMPLE_SIZE: usize = 5;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const TIME_FIELD_TOKENS: &[&str] = &[
    "date", "time", "timestamp", "period", "month", "quarter", "year", "week", "day", "dt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    QuarterYear,
    YearQuarter,
    Monthly,
    MonthYear,
    QuarterStart,
    Year,
    IsoDate,
    IsoWeek,
}

struct PeriodRule {
    kind: PeriodKind,
    pattern: Regex,
    to_date: fn(&Captures) -> Option<NaiveDate>,
    label: fn(&Captures) -> Option<String>,
}

impl PeriodRule {
    fn new(
        kind: PeriodKind,
        pattern: &str,
        to_date: fn(&Captures) -> Option<NaiveDate>,
        label: fn(&Captures) -> Option<String>,
    ) -> Self {
        Self {
            kind,
            // Patterns are compile-time literals covered by the tests below.
            pattern: Regex::new(pattern).expect("invalid period pattern"),
            to_date,
            label,
        }
    }

    fn captures<'a>(&self, raw: &'a str) -> Option<Captures<'a>> {
        self.pattern.captures(raw)
    }
}

/// Rules in priority order. New formats are added here, nowhere else.
static RULES: LazyLock<Vec<PeriodRule>> = LazyLock::new(|| {
    vec![
        PeriodRule::new(
            PeriodKind::QuarterYear,
            r"(?i)^Q([1-4])[\s\-/']*(\d{4})$",
            |c| quarter_start(num(c, 2)?, num(c, 1)?),
            |c| Some(format!("Q{} {}", num(c, 1)?, num(c, 2)?)),
        ),
        PeriodRule::new(
            PeriodKind::YearQuarter,
            r"(?i)^(\d{4})[\s\-/]*Q([1-4])$",
            |c| quarter_start(num(c, 1)?, num(c, 2)?),
            |c| Some(format!("Q{} {}", num(c, 2)?, num(c, 1)?)),
        ),
        PeriodRule::new(
            PeriodKind::Monthly,
            r"^(\d{4})-(0[1-9]|1[0-2])$",
            |c| NaiveDate::from_ymd_opt(num(c, 1)? as i32, num(c, 2)?, 1),
            |c| Some(month_label(num(c, 2)?, num(c, 1)?)),
        ),
        PeriodRule::new(
            PeriodKind::MonthYear,
            r"(?i)^(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?[\s\-/']*(\d{4}|\d{2})$",
            |c| NaiveDate::from_ymd_opt(full_year(c, 2)? as i32, month_index(&c[1])?, 1),
            |c| Some(month_label(month_index(&c[1])?, full_year(c, 2)?)),
        ),
        PeriodRule::new(
            PeriodKind::QuarterStart,
            r"^(\d{4})-(01|04|07|10)-01(?:[T ][0-9:.]+(?:Z|[+-]\d{2}:?\d{2})?)?$",
            |c| NaiveDate::from_ymd_opt(num(c, 1)? as i32, num(c, 2)?, 1),
            |c| Some(format!("Q{} {}", (num(c, 2)? - 1) / 3 + 1, num(c, 1)?)),
        ),
        PeriodRule::new(
            PeriodKind::Year,
            r"^((?:19|20|21)\d{2})$",
            |c| NaiveDate::from_ymd_opt(num(c, 1)? as i32, 1, 1),
            |c| Some(c[1].to_string()),
        ),
        PeriodRule::new(
            PeriodKind::IsoDate,
            r"^(\d{4})-(\d{2})-(\d{2})(?:[T ][0-9:.]+(?:Z|[+-]\d{2}:?\d{2})?)?$",
            |c| NaiveDate::from_ymd_opt(num(c, 1)? as i32, num(c, 2)?, num(c, 3)?),
            |c| Some(format!("{}-{}-{}", &c[1], &c[2], &c[3])),
        ),
        PeriodRule::new(
            PeriodKind::IsoWeek,
            r"(?i)^(\d{4})-?W(\d{1,2})$",
            |c| NaiveDate::from_isoywd_opt(num(c, 1)? as i32, num(c, 2)?, chrono::Weekday::Mon),
            |c| Some(format!("W{:02} {}", num(c, 2)?, num(c, 1)?)),
        ),
    ]
});

fn num(c: &Captures, idx: usize) -> Option<u32> {
    c.get(idx)?.as_str().parse().ok()
}

fn full_year(c: &Captures, idx: usize) -> Option<u32> {
    let year = num(c, idx)?;
    Some(if year < 100 { 2000 + year } else { year })
}

fn month_index(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?;
    MONTHS
        .iter()
        .position(|m| m.eq_ignore_ascii_case(prefix))
        .map(|i| i as u32 + 1)
}

fn month_label(month: u32, year: u32) -> String {
    let name = MONTHS.get(month.saturating_sub(1) as usize).unwrap_or(&"???");
    format!("{} {}", name, year)
}

fn quarter_start(year: u32, quarter: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year as i32, (quarter - 1) * 3 + 1, 1)
}

fn first_match(raw: &str) -> Option<(&'static PeriodRule, Captures<'_>)> {
    let raw = raw.trim();
    RULES
        .iter()
        .find_map(|rule| rule.captures(raw).map(|caps| (rule, caps)))
}

/// Classify a field from its leading values: the first rule every sampled
/// non-empty value satisfies wins.
pub fn classify_values<'a, I>(values: I) -> Option<PeriodKind>
where
    I: IntoIterator<Item = &'a str>,
{
    let sample: Vec<&str> = values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .take(SAMPLE_SIZE)
        .collect();
    if sample.is_empty() {
        return None;
    }

    RULES
        .iter()
        .find(|rule| sample.iter().all(|v| rule.pattern.is_match(v)))
        .map(|rule| rule.kind)
}

/// Header text for a period value; unrecognized values pass through unchanged.
pub fn format_period(raw: &str) -> String {
    first_match(raw)
        .and_then(|(rule, caps)| (rule.label)(&caps))
        .unwrap_or_else(|| raw.to_string())
}

/// Calendar date a period value starts on, when it is recognized.
pub fn period_date(raw: &str) -> Option<NaiveDate> {
    first_match(raw).and_then(|(rule, caps)| (rule.to_date)(&caps))
}

/// Chronological when both sides parse, lexicographic otherwise.
pub fn compare_periods(a: &str, b: &str) -> Ordering {
    match (period_date(a), period_date(b)) {
        (Some(da), Some(db)) => da.cmp(&db).then_with(|| a.cmp(b)),
        _ => a.cmp(b),
    }
}

/// Whether a column name reads like a date/period field (`date`, `block_time`, `fiscalQuarter`).
pub fn is_time_field_name(name: &str) -> bool {
    let mut spaced = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() && i > 0 {
            spaced.push('_');
        }
        spaced.push(ch.to_ascii_lowercase());
    }
    spaced
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|token| TIME_FIELD_TOKENS.contains(&token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_encodings_share_one_header() {
        for raw in ["2024-Q2", "Q2-2024", "Q2 2024", "2024-04-01", "q2/2024"] {
            assert_eq!(format_period(raw), "Q2 2024", "input {raw}");
        }
    }

    #[test]
    fn test_month_and_week_headers() {
        assert_eq!(format_period("2024-03"), "Mar 2024");
        assert_eq!(format_period("March 2024"), "Mar 2024");
        assert_eq!(format_period("Sep-23"), "Sep 2023");
        assert_eq!(format_period("2024-W05"), "W05 2024");
        assert_eq!(format_period("2024-02-15T00:00:00Z"), "2024-02-15");
        assert_eq!(format_period("2021"), "2021");
    }

    #[test]
    fn test_unrecognized_values_pass_through() {
        assert_eq!(format_period("Solana"), "Solana");
        assert_eq!(format_period("2024-13"), "2024-13");
        assert_eq!(classify_values(["hello"]), None);
    }

    #[test]
    fn test_first_rule_wins() {
        assert_eq!(classify_values(["2024-01-01"]), Some(PeriodKind::QuarterStart));
        assert_eq!(classify_values(["2024-02-01"]), Some(PeriodKind::IsoDate));
        assert_eq!(classify_values(["2024-01"]), Some(PeriodKind::Monthly));
    }

    #[test]
    fn test_classify_values_requires_whole_sample() {
        let monthly_firsts = ["2024-01-01", "2024-02-01", "2024-03-01"];
        assert_eq!(
            classify_values(monthly_firsts.iter().copied()),
            Some(PeriodKind::IsoDate)
        );

        let quarters = ["2024-01-01", "2024-04-01", ""];
        assert_eq!(
            classify_values(quarters.iter().copied()),
            Some(PeriodKind::QuarterStart)
        );

        let names = ["alice", "2024-01"];
        assert_eq!(classify_values(names.iter().copied()), None);
    }

    #[test]
    fn test_compare_is_chronological_across_encodings() {
        let mut periods = vec!["Q1 2025", "2024-Q3", "Jan 2024", "2024-05", "2023"];
        periods.sort_by(|a, b| compare_periods(a, b));
        assert_eq!(periods, vec!["2023", "Jan 2024", "2024-05", "2024-Q3", "Q1 2025"]);
    }

    #[test]
    fn test_compare_falls_back_to_strings() {
        assert_eq!(compare_periods("2024-01", "zeta"), "2024-01".cmp("zeta"));
        assert_eq!(compare_periods("b", "a"), Ordering::Greater);
    }

    #[test]
    fn test_time_field_names() {
        assert!(is_time_field_name("date"));
        assert!(is_time_field_name("block_time"));
        assert!(is_time_field_name("fiscalQuarter"));
        assert!(!is_time_field_name("revenue"));
        assert!(!is_time_field_name("updated_by"));
    }
}
