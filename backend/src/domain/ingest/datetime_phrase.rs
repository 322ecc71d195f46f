//! Scheduled-arrival phrases in the Russian locale.
//!
//! Recognised forms, tried in this order:
//!
//! - `DD.MM.YYYY [в] [HH:MM]`
//! - `[сегодня|завтра|послезавтра] с X до Y` (interval; the start is the
//!   representative instant)
//! - `[день] до X`, `[день] после X`
//! - `сегодня|завтра|послезавтра [в|к|на|около] [HH[:MM]]`
//! - `через N часов`, `через N-M часа`, `через N минут`, `(через) полчаса`,
//!   `(через) полтора часа`, `через час`
//! - bare `[в|к|на|около] HH:MM` (today if strictly in the future, otherwise
//!   tomorrow)
//!
//! An instant outside `[now - 5 min, now + 365 days]` is dropped; the phrase
//! is then kept as text only.

use std::sync::OnceLock;

use chrono::{DateTime, Days, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Interpreted scheduled-arrival phrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTime {
    /// Text as the client wrote it.
    pub display: String,
    /// Representative instant, when one could be bound.
    pub at: Option<DateTime<Utc>>,
}

/// Phrase located inside a longer line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseMatch {
    pub scheduled: ScheduledTime,
    /// Byte range of the phrase in the searched line.
    pub start: usize,
    pub end: usize,
}

type Resolver = fn(&Captures<'_>, DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>>;

struct Rule {
    pattern: &'static str,
    resolve: Resolver,
}

const DAY: &str = r"(?:(сегодня|завтра|послезавтра)\s+)?";

static RULES: OnceLock<Vec<(Regex, Resolver)>> = OnceLock::new();

fn rules() -> &'static [(Regex, Resolver)] {
    RULES.get_or_init(|| {
        let specs = [
            Rule {
                pattern: r"(?i)\b(\d{1,2})\.(\d{1,2})\.(\d{4})(?:\s+(?:в\s+)?(\d{1,2}):(\d{2}))?\b",
                resolve: resolve_date,
            },
            Rule {
                pattern: r"(?i)\bDAYс\s+(\d{1,2})(?::(\d{2}))?\s+до\s+(\d{1,2})(?::(\d{2}))?\b",
                resolve: resolve_day_bound,
            },
            Rule {
                pattern: r"(?i)\bDAY(?:до|после)\s+(\d{1,2})(?::(\d{2}))?\b",
                resolve: resolve_day_bound,
            },
            Rule {
                pattern: r"(?i)\b(сегодня|завтра|послезавтра)(?:\s+(?:в|к|на|около))?(?:\s+(\d{1,2})(?::(\d{2}))?\b)?",
                resolve: resolve_day_bound,
            },
            Rule {
                pattern: r"(?i)\b(?:через\s+(полчаса|полтора\s+часа|час)|(полчаса|полтора\s+часа))\b",
                resolve: resolve_word_offset,
            },
            Rule {
                pattern: r"(?i)\bчерез\s+(\d+(?:[.,]\d+)?)(?:\s*-\s*(\d+(?:[.,]\d+)?))?\s*(час(?:а|ов)?|ч\b|мин(?:ут[уы]?)?\b)",
                resolve: resolve_numeric_offset,
            },
            Rule {
                pattern: r"(?i)(?:\b(?:в|к|на|около)\s+)?\b(\d{1,2}):(\d{2})\b",
                resolve: resolve_bare_time,
            },
        ];
        specs
            .into_iter()
            .map(|rule| {
                let pattern = rule.pattern.replace("DAY", DAY);
                let regex = Regex::new(&pattern)
                    .unwrap_or_else(|error| panic!("datetime pattern failed to compile: {error}"));
                (regex, rule.resolve)
            })
            .collect()
    })
}

/// Find the first recognised phrase in `line`.
///
/// # Examples
/// ```
/// use chrono::{FixedOffset, TimeZone};
/// use dispatch_backend::domain::find_phrase;
///
/// let zone = FixedOffset::east_opt(3 * 3600).expect("valid offset");
/// let now = zone.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid time");
/// let found = find_phrase("+79001234567 завтра к 14:00", now).expect("phrase");
/// assert_eq!(found.scheduled.display, "завтра к 14:00");
/// assert_eq!(
///     found.scheduled.at.map(|at| at.to_rfc3339()),
///     Some("2026-03-03T11:00:00+00:00".to_owned())
/// );
/// ```
pub fn find_phrase(line: &str, now: DateTime<FixedOffset>) -> Option<PhraseMatch> {
    for (regex, resolve) in rules() {
        for captures in regex.captures_iter(line) {
            let Some(whole) = captures.get(0) else {
                continue;
            };
            let Some(instant) = resolve(&captures, now).map(Some).or_else(|| {
                // Day words without a time are phrases without an instant.
                is_bare_day(&captures).then_some(None)
            }) else {
                continue;
            };
            let text = whole.as_str();
            let leading = text.len() - text.trim_start().len();
            let display = text.trim().to_owned();
            return Some(PhraseMatch {
                start: whole.start() + leading,
                end: whole.start() + leading + display.len(),
                scheduled: ScheduledTime {
                    display,
                    at: instant.and_then(|at| within_window(at, now)),
                },
            });
        }
    }
    None
}

/// Interpret a whole scheduled-arrival phrase.
///
/// Text without a recognised phrase is kept verbatim without an instant.
pub fn interpret_phrase(phrase: &str, now: DateTime<FixedOffset>) -> ScheduledTime {
    let display = phrase.trim().to_owned();
    let at = find_phrase(&display, now).and_then(|found| found.scheduled.at);
    ScheduledTime { display, at }
}

fn within_window(at: DateTime<FixedOffset>, now: DateTime<FixedOffset>) -> Option<DateTime<Utc>> {
    let earliest = now - Duration::minutes(5);
    let latest = now + Duration::days(365);
    (earliest <= at && at <= latest).then(|| at.with_timezone(&Utc))
}

fn is_bare_day(captures: &Captures<'_>) -> bool {
    captures.len() == 4
        && captures.get(1).is_some()
        && captures.get(2).is_none()
        && captures
            .get(0)
            .is_some_and(|whole| day_offset(whole.as_str().trim()).is_some())
}

fn number(captures: &Captures<'_>, index: usize) -> Option<u32> {
    captures.get(index)?.as_str().parse().ok()
}

fn time_of(captures: &Captures<'_>, hour: usize, minute: usize) -> Option<NaiveTime> {
    let hour = number(captures, hour)?;
    let minute = captures
        .get(minute)
        .map_or(Some(0), |value| value.as_str().parse().ok())?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn day_offset(word: &str) -> Option<u64> {
    match word.to_lowercase().as_str() {
        "сегодня" => Some(0),
        "завтра" => Some(1),
        "послезавтра" => Some(2),
        _ => None,
    }
}

fn on_day(
    now: DateTime<FixedOffset>,
    days: u64,
    time: NaiveTime,
) -> Option<DateTime<FixedOffset>> {
    let date = now.date_naive().checked_add_days(Days::new(days))?;
    now.timezone()
        .from_local_datetime(&date.and_time(time))
        .single()
}

/// Today if strictly in the future, otherwise tomorrow.
fn next_occurrence(now: DateTime<FixedOffset>, time: NaiveTime) -> Option<DateTime<FixedOffset>> {
    let today = on_day(now, 0, time)?;
    if today > now {
        Some(today)
    } else {
        on_day(now, 1, time)
    }
}

fn resolve_date(captures: &Captures<'_>, now: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::from_ymd_opt(
        captures.get(3)?.as_str().parse().ok()?,
        number(captures, 2)?,
        number(captures, 1)?,
    )?;
    let time = if captures.get(4).is_some() {
        time_of(captures, 4, 5)?
    } else {
        NaiveTime::MIN
    };
    now.timezone()
        .from_local_datetime(&date.and_time(time))
        .single()
}

/// Day-qualified bound: group 1 is the optional day word, groups 2 and 3 the
/// hour and minute.
fn resolve_day_bound(
    captures: &Captures<'_>,
    now: DateTime<FixedOffset>,
) -> Option<DateTime<FixedOffset>> {
    captures.get(2)?;
    let time = time_of(captures, 2, 3)?;
    match captures.get(1) {
        Some(day) => on_day(now, day_offset(day.as_str())?, time),
        None => next_occurrence(now, time),
    }
}

fn resolve_word_offset(
    captures: &Captures<'_>,
    now: DateTime<FixedOffset>,
) -> Option<DateTime<FixedOffset>> {
    let word = captures.get(1).or_else(|| captures.get(2))?.as_str().to_lowercase();
    let minutes = if word == "полчаса" {
        30
    } else if word.starts_with("полтора") {
        90
    } else {
        60
    };
    Some(now + Duration::minutes(minutes))
}

fn parse_amount(text: &str) -> Option<Decimal> {
    text.replace(',', ".").parse().ok()
}

fn resolve_numeric_offset(
    captures: &Captures<'_>,
    now: DateTime<FixedOffset>,
) -> Option<DateTime<FixedOffset>> {
    let low = parse_amount(captures.get(1)?.as_str())?;
    let amount = match captures.get(2) {
        Some(high) => (low + parse_amount(high.as_str())?) / Decimal::TWO,
        None => low,
    };
    let unit_minutes = if captures.get(3)?.as_str().to_lowercase().starts_with("мин") {
        Decimal::ONE
    } else {
        Decimal::from(60)
    };
    let minutes = (amount * unit_minutes).round().to_i64()?;
    if minutes > 366 * 24 * 60 {
        return None;
    }
    Some(now + Duration::minutes(minutes))
}

fn resolve_bare_time(
    captures: &Captures<'_>,
    now: DateTime<FixedOffset>,
) -> Option<DateTime<FixedOffset>> {
    next_occurrence(now, time_of(captures, 1, 2)?)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3 * 3600)
            .and_then(|zone| zone.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single())
            .expect("valid time")
    }

    fn utc(text: &str) -> Option<DateTime<Utc>> {
        Some(
            DateTime::parse_from_rfc3339(text)
                .expect("valid timestamp")
                .with_timezone(&Utc),
        )
    }

    #[rstest]
    #[case("завтра к 14:00", "2026-03-03T11:00:00Z")]
    #[case("15:00", "2026-03-02T12:00:00Z")]
    #[case("08:30", "2026-03-03T05:30:00Z")]
    #[case("через 1.5 часа", "2026-03-02T07:30:00Z")]
    #[case("через 2-3 часа", "2026-03-02T08:30:00Z")]
    #[case("через 40 минут", "2026-03-02T06:40:00Z")]
    #[case("полчаса", "2026-03-02T06:30:00Z")]
    #[case("через полтора часа", "2026-03-02T07:30:00Z")]
    #[case("с 10 до 16", "2026-03-02T07:00:00Z")]
    #[case("завтра с 10 до 16", "2026-03-03T07:00:00Z")]
    #[case("до 12", "2026-03-02T09:00:00Z")]
    #[case("после 16", "2026-03-02T13:00:00Z")]
    #[case("05.03.2026 10:30", "2026-03-05T07:30:00Z")]
    fn phrases_bind_to_instants(
        now: DateTime<FixedOffset>,
        #[case] phrase: &str,
        #[case] expected: &str,
    ) {
        let scheduled = interpret_phrase(phrase, now);
        assert_eq!(scheduled.display, phrase);
        assert_eq!(scheduled.at, utc(expected));
    }

    #[rstest]
    #[case("05.03.2028 10:00")]
    #[case("01.03.2026")]
    #[case("завтра")]
    fn out_of_window_or_dateless_phrases_stay_textual(
        now: DateTime<FixedOffset>,
        #[case] phrase: &str,
    ) {
        let found = find_phrase(phrase, now).expect("recognised phrase");
        assert_eq!(found.scheduled.display, phrase);
        assert_eq!(found.scheduled.at, None);
    }

    #[rstest]
    fn phrases_are_located_inside_lines(now: DateTime<FixedOffset>) {
        let line = "+79001234567 завтра к 14:00";
        let found = find_phrase(line, now).expect("phrase");
        assert_eq!(&line[found.start..found.end], "завтра к 14:00");
    }

    #[rstest]
    #[case("не крутит барабан")]
    #[case("ул. Ленина 5-10")]
    #[case("25:99")]
    fn unrelated_text_has_no_phrase(now: DateTime<FixedOffset>, #[case] line: &str) {
        assert_eq!(find_phrase(line, now), None);
    }

    #[rstest]
    fn unknown_text_is_kept_verbatim(now: DateTime<FixedOffset>) {
        let scheduled = interpret_phrase("  как договоримся ", now);
        assert_eq!(scheduled.display, "как договоримся");
        assert_eq!(scheduled.at, None);
    }
}
