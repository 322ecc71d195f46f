//! Free-form feed messages to candidate orders.
//!
//! Best effort and locale specific: phone formats, address keywords, the
//! equipment dictionary and datetime phrases all follow the Russian feed the
//! platform reads from.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset};
use regex::Regex;

use super::{
    Candidate, ParseFailure, ScheduledTime, canonical_equipment, find_phrase,
};
use crate::domain::phone::phone_regex;
use crate::domain::{DEFAULT_CLIENT_NAME, MessageId, Order, normalize_phone};

/// Street types; a sentence is split before the first one.
const STREET_KEYWORDS: &[&str] = &[
    "ул", "улица", "пр", "пр-т", "пр-кт", "проспект", "пер", "переулок", "бул", "бульвар", "б-р",
    "шоссе", "ш", "наб", "набережная", "пл", "площадь", "мкр", "микрорайон", "проезд", "тупик",
    "street", "st", "avenue", "ave", "lane", "road", "rd",
];

/// Building parts that mark a line as an address.
const ADDRESS_MARKERS: &[&str] = &[
    "д", "дом", "кв", "квартира", "корп", "корпус", "стр", "строение", "подъезд", "этаж",
    "эт", "apt",
];

/// Abbreviations whose dot does not end a sentence.
const ABBREVIATIONS: &[&str] = &["г", "гор", "пос", "им", "обл", "р-н", "тел"];

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
static PHONE_LIKE_RE: OnceLock<Regex> = OnceLock::new();
static SHORT_ADDRESS_RE: OnceLock<Regex> = OnceLock::new();

fn token_regex() -> &'static Regex {
    TOKEN_RE.get_or_init(|| {
        Regex::new(r"\S+").unwrap_or_else(|error| panic!("token regex failed to compile: {error}"))
    })
}

fn phone_like_regex() -> &'static Regex {
    PHONE_LIKE_RE.get_or_init(|| {
        Regex::new(r"\+?\d[\d\s\-()]{4,}\d")
            .unwrap_or_else(|error| panic!("phone-like regex failed to compile: {error}"))
    })
}

/// `Ленина 5-10`, `Красная Пресня 12/3`.
fn short_address_regex() -> &'static Regex {
    SHORT_ADDRESS_RE.get_or_init(|| {
        Regex::new(
            r"^\p{Lu}[\p{L}\-]+(?:\s+\p{L}[\p{L}\-]*)?,?\s+\d+\p{L}?(?:\s*[-/,]\s*\d+\p{L}?)*$",
        )
        .unwrap_or_else(|error| panic!("address regex failed to compile: {error}"))
    })
}

/// Lower-cased head of a token, up to the first dot or comma.
fn keyword(token: &str) -> String {
    token
        .split(['.', ',', ':', ';'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

fn is_street_keyword(token: &str) -> bool {
    STREET_KEYWORDS.contains(&keyword(token).as_str())
}

fn clean(piece: &str) -> String {
    piece
        .trim()
        .trim_start_matches([',', ';', ':', '-'])
        .trim_end_matches([',', ';', '.'])
        .trim()
        .to_owned()
}

/// Non-empty trimmed lines; a single line is split further on sentence ends
/// and before street keywords.
fn split_lines(text: &str) -> Vec<String> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let pieces: Vec<String> = match lines.as_slice() {
        [single] => split_sentences(single)
            .iter()
            .flat_map(|sentence| split_before_street(sentence))
            .collect(),
        _ => lines.iter().map(|line| (*line).to_owned()).collect(),
    };
    pieces
        .iter()
        .map(|piece| clean(piece))
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Split after `.` followed by whitespace and an upper-case letter, a digit or
/// `+`, unless the dot closes an abbreviation.
fn split_sentences(line: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = line.char_indices().collect();
    let mut pieces = Vec::new();
    let mut start = 0;
    for (position, (index, ch)) in chars.iter().copied().enumerate() {
        if ch != '.' {
            continue;
        }
        let mut following = chars.iter().skip(position + 1).map(|(_, next)| *next);
        if !following.next().is_some_and(char::is_whitespace) {
            continue;
        }
        let Some(first) = following.find(|next| !next.is_whitespace()) else {
            continue;
        };
        if !(first.is_uppercase() || first.is_ascii_digit() || first == '+') {
            continue;
        }
        let sentence = line.get(start..index).unwrap_or_default();
        let last_word = sentence.split_whitespace().last().unwrap_or_default();
        let head = keyword(last_word);
        if STREET_KEYWORDS.contains(&head.as_str())
            || ADDRESS_MARKERS.contains(&head.as_str())
            || ABBREVIATIONS.contains(&head.as_str())
        {
            continue;
        }
        pieces.push(sentence.to_owned());
        start = index + 1;
    }
    pieces.push(line.get(start..).unwrap_or_default().to_owned());
    pieces
}

fn split_before_street(sentence: &str) -> Vec<String> {
    let split_at = token_regex()
        .find_iter(sentence)
        .skip(1)
        .find(|token| is_street_keyword(token.as_str()))
        .map(|token| token.start());
    match split_at {
        Some(at) => vec![
            sentence.get(..at).unwrap_or_default().to_owned(),
            sentence.get(at..).unwrap_or_default().to_owned(),
        ],
        None => vec![sentence.to_owned()],
    }
}

fn remove_span(lines: &mut Vec<String>, index: usize, range: std::ops::Range<usize>) {
    if let Some(line) = lines.get_mut(index) {
        line.replace_range(range, " ");
        *line = clean(line);
    }
    lines.retain(|line| !line.is_empty());
}

fn has_phone_like_run(line: &str) -> bool {
    phone_like_regex().find_iter(line).any(|run| {
        let digits = run.as_str().chars().filter(char::is_ascii_digit).count();
        (7..=10).contains(&digits)
    })
}

fn extract_phone(lines: &mut Vec<String>) -> Result<Option<String>, ParseFailure> {
    let hit = lines.iter().enumerate().find_map(|(index, line)| {
        phone_regex().find_iter(line).find_map(|found| {
            normalize_phone(found.as_str()).map(|phone| (index, found.range(), phone))
        })
    });
    if let Some((index, range, phone)) = hit {
        remove_span(lines, index, range);
        return Ok(Some(phone));
    }
    if lines.iter().any(|line| has_phone_like_run(line)) {
        return Err(ParseFailure::invalid_phone());
    }
    Ok(None)
}

fn extract_schedule(lines: &mut Vec<String>, now: DateTime<FixedOffset>) -> Option<ScheduledTime> {
    let (index, found) = lines
        .iter()
        .enumerate()
        .find_map(|(index, line)| find_phrase(line, now).map(|found| (index, found)))?;
    remove_span(lines, index, found.start..found.end);
    Some(found.scheduled)
}

/// Whether a line reads like an address.
pub fn is_address_like(line: &str) -> bool {
    let has_keyword = line.split_whitespace().any(|token| {
        let head = keyword(token);
        STREET_KEYWORDS.contains(&head.as_str()) || ADDRESS_MARKERS.contains(&head.as_str())
    });
    has_keyword || short_address_regex().is_match(line)
}

/// Equipment from the first one or two tokens; everything else is the
/// problem description.
fn split_equipment(lines: &[String]) -> (String, String) {
    let Some((first, rest)) = lines.split_first() else {
        return (String::new(), String::new());
    };
    let tokens: Vec<&str> = first.split_whitespace().collect();
    let leading = |count: usize| tokens.iter().take(count).copied().collect::<Vec<_>>().join(" ");

    let two_words = (tokens.len() >= 2)
        .then(|| canonical_equipment(&leading(2)))
        .flatten();
    let (equipment, consumed) = match two_words {
        Some(canonical) => (canonical.to_owned(), 2),
        None => match canonical_equipment(&leading(1)) {
            Some(canonical) => (canonical.to_owned(), 1),
            None => (
                tokens
                    .first()
                    .map(|token| token.trim_end_matches([',', ':', '.']).to_owned())
                    .unwrap_or_default(),
                1,
            ),
        },
    };

    let residue = tokens
        .iter()
        .skip(consumed)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let problem = std::iter::once(residue.as_str())
        .chain(rest.iter().map(String::as_str))
        .map(clean)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (equipment, problem)
}

/// Parse one feed message.
///
/// # Examples
/// ```
/// use chrono::{FixedOffset, TimeZone};
/// use dispatch_backend::domain::{MessageId, parse_message};
///
/// let zone = FixedOffset::east_opt(3 * 3600).expect("valid offset");
/// let now = zone.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single().expect("valid time");
/// let candidate = parse_message(
///     "С/м не крутит барабан. ул. Ленина 5-10. +79001234567 завтра к 14:00",
///     MessageId::new(12345),
///     now,
/// )
/// .expect("order message");
/// assert_eq!(candidate.equipment_type, "Washing machine");
/// assert_eq!(candidate.problem_description, "не крутит барабан");
/// assert_eq!(candidate.client_address, "ул. Ленина 5-10");
/// ```
pub fn parse_message(
    text: &str,
    message_id: MessageId,
    now: DateTime<FixedOffset>,
) -> Result<Candidate, ParseFailure> {
    let mut lines = split_lines(text);
    let client_phone = extract_phone(&mut lines)?;
    let scheduled = extract_schedule(&mut lines, now);

    let (address_lines, other_lines): (Vec<String>, Vec<String>) =
        lines.into_iter().partition(|line| is_address_like(line));
    let client_address = address_lines.join(", ");
    let (equipment_type, problem_description) = split_equipment(&other_lines);

    let mut missing = Vec::new();
    if client_address.is_empty() {
        missing.push(ParseFailure::ADDRESS);
    }
    if problem_description.is_empty()
        || problem_description.to_lowercase() == equipment_type.to_lowercase()
    {
        missing.push(ParseFailure::PROBLEM_DESCRIPTION);
    }
    if !missing.is_empty() {
        return Err(ParseFailure::missing_fields(missing));
    }

    Ok(Candidate {
        equipment_type,
        problem_description,
        client_name: DEFAULT_CLIENT_NAME.to_owned(),
        client_address,
        client_phone,
        scheduled,
        original_text: text.to_owned(),
        message_id,
    })
}

fn render_lines(
    equipment_type: &str,
    problem_description: &str,
    client_address: &str,
    client_phone: Option<&str>,
    scheduled_time: Option<&str>,
) -> String {
    let mut lines = vec![
        format!("{equipment_type} {problem_description}"),
        client_address.to_owned(),
    ];
    lines.extend(client_phone.map(str::to_owned));
    lines.extend(scheduled_time.map(str::to_owned));
    lines.join("\n")
}

/// Canonical text form of a candidate; parsing it yields the same fields.
pub fn render_candidate(candidate: &Candidate) -> String {
    render_lines(
        &candidate.equipment_type,
        &candidate.problem_description,
        &candidate.client_address,
        candidate.client_phone.as_deref(),
        candidate
            .scheduled
            .as_ref()
            .map(|scheduled| scheduled.display.as_str()),
    )
}

/// Canonical text form of an order's parser-visible fields.
pub fn render_order(order: &Order) -> String {
    render_lines(
        &order.equipment_type,
        &order.problem_description,
        &order.client_address,
        order.client_phone.as_deref(),
        order.scheduled_time.as_deref(),
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rstest::{fixture, rstest};

    use super::*;
    use crate::domain::ParseFailureKind;

    const S5_TEXT: &str = "С/м не крутит барабан. ул. Ленина 5-10. +79001234567 завтра к 14:00";

    #[fixture]
    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3 * 3600)
            .and_then(|zone| zone.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).single())
            .expect("valid time")
    }

    #[rstest]
    fn parses_a_single_line_order(now: DateTime<FixedOffset>) {
        let candidate = parse_message(S5_TEXT, MessageId::new(12345), now).expect("parsed");

        assert_eq!(candidate.equipment_type, "Washing machine");
        assert_eq!(candidate.problem_description, "не крутит барабан");
        assert_eq!(candidate.client_address, "ул. Ленина 5-10");
        assert_eq!(candidate.client_phone.as_deref(), Some("+79001234567"));
        assert_eq!(candidate.client_name, "Client");
        let scheduled = candidate.scheduled.expect("scheduled time");
        assert_eq!(scheduled.display, "завтра к 14:00");
        assert_eq!(
            scheduled.at,
            Utc.with_ymd_and_hms(2026, 3, 3, 11, 0, 0).single()
        );
        assert_eq!(candidate.message_id, MessageId::new(12345));
    }

    #[rstest]
    fn parses_a_multi_line_order(now: DateTime<FixedOffset>) {
        let text = "Стиральная машина\nтечёт из-под люка\nЛенина 12/3\n8 (900) 765-43-21";
        let candidate = parse_message(text, MessageId::new(1), now).expect("parsed");

        assert_eq!(candidate.equipment_type, "Washing machine");
        assert_eq!(candidate.problem_description, "течёт из-под люка");
        assert_eq!(candidate.client_address, "Ленина 12/3");
        assert_eq!(candidate.client_phone.as_deref(), Some("+79007654321"));
        assert_eq!(candidate.scheduled, None);
    }

    #[rstest]
    fn unknown_equipment_keeps_the_first_word(now: DateTime<FixedOffset>) {
        let text = "Утюг не греется\nул. Мира 7\n+79001112233";
        let candidate = parse_message(text, MessageId::new(2), now).expect("parsed");
        assert_eq!(candidate.equipment_type, "Утюг");
        assert_eq!(candidate.problem_description, "не греется");
    }

    #[rstest]
    fn short_digit_runs_are_invalid_phones(now: DateTime<FixedOffset>) {
        let text = "С/м не сливает воду\nул. Ленина 5\n900 12 34";
        let failure = parse_message(text, MessageId::new(3), now).expect_err("bad phone");
        assert_eq!(failure.kind, ParseFailureKind::InvalidFormat);
        assert_eq!(failure.missing_fields, vec!["phone".to_owned()]);
        assert!(failure.should_report());
    }

    #[rstest]
    fn missing_address_is_not_reported(now: DateTime<FixedOffset>) {
        let failure = parse_message("Холодильник не морозит совсем", MessageId::new(4), now)
            .expect_err("no address");
        assert_eq!(failure.kind, ParseFailureKind::MissingFields);
        assert_eq!(failure.missing_fields, vec!["address".to_owned()]);
        assert!(!failure.should_report());
    }

    #[rstest]
    fn equipment_alone_is_not_a_problem_description(now: DateTime<FixedOffset>) {
        let failure = parse_message("Холодильник\nул. Мира 7", MessageId::new(5), now)
            .expect_err("no problem");
        assert_eq!(
            failure.missing_fields,
            vec!["problem_description".to_owned()]
        );
        assert!(failure.should_report());
    }

    #[rstest]
    fn rendered_candidates_parse_back(now: DateTime<FixedOffset>) {
        let original = parse_message(S5_TEXT, MessageId::new(12345), now).expect("parsed");
        let reparsed =
            parse_message(&render_candidate(&original), MessageId::new(12345), now).expect("parsed");

        assert_eq!(reparsed.equipment_type, original.equipment_type);
        assert_eq!(reparsed.problem_description, original.problem_description);
        assert_eq!(reparsed.client_address, original.client_address);
        assert_eq!(reparsed.client_phone, original.client_phone);
        assert_eq!(reparsed.scheduled, original.scheduled);
    }

    #[rstest]
    #[case("ул. Ленина 5-10", true)]
    #[case("Ленина 5-10", true)]
    #[case("д. 4, кв. 12", true)]
    #[case("не крутит барабан", false)]
    #[case("С/м не крутит барабан", false)]
    fn address_predicate(#[case] line: &str, #[case] expected: bool) {
        assert_eq!(is_address_like(line), expected);
    }
}
