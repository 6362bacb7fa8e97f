//! Transaction extraction from free-form text.
//!
//! Turns one user message ("обед 400, кофе 250, такси 500") into an ordered
//! list of [`TransactionCandidate`]s with amounts and cleaned descriptions.
//! Categories are assigned later by the pipeline.
//!
//! # Algorithm
//!
//! 1. Reject empty and oversized messages.
//! 2. Join thousands groups ("1 500" -> "1500") so the amount grammar stays
//!    simple.
//! 3. Split on strong delimiters: `;`, newlines, commas that are not a
//!    decimal separator, and the conjunctions и / а также / and / plus.
//! 4. Split each segment greedily at amount boundaries. Clock times
//!    ("в 12:30") are part of the description and never amounts. Description-first
//!    text ("такси 500 кофе 200") is cut after each amount, amount-first text
//!    ("500 такси 200 кофе") before each.
//! 5. Pieces without an amount are merged into the previous piece (or the
//!    next one when they lead the message).
//! 6. Descriptions are stripped of amounts, currency marks and filler words.

use std::ops::Range;
use std::str::FromStr;
use std::sync::LazyLock;

use purse_types::{ParseError, TransactionCandidate};
use regex::{Captures, Regex};
use rust_decimal::Decimal;

/// Longest message the extractor accepts, in chars.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Amount grammar, applied after thousands groups have been joined.
const AMOUNT_PATTERN: &str = r"(?ix)
    (?P<pre>[$€]\s?)?
    \b(?P<int>\d+)
    (?:[.,](?P<frac>\d+))?
    (?P<mult>\s?(?:тысяч[аи]?|тыс)\b\.?|[кk]\b|т\.)?
    (?:\s?(?P<cur>₽|\$|€|(?:рублей|рубля|рубль|руб|р|rub|usd|eur)\b\.?))?
";

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(AMOUNT_PATTERN).expect("amount pattern is a valid regex"));

static CLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:[01]?\d|2[0-3]):[0-5]\d\b").expect("clock pattern is a valid regex"));

static CONJUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:а\s+также|и|and|plus)\s+").expect("conjunction pattern is a valid regex")
});

static CURRENCY_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)₽|\$|€|\b(?:рублей|рубля|рубль|руб|rub|usd|eur)\b\.?")
        .expect("currency pattern is a valid regex")
});

/// Words that carry no meaning in a description.
const FILLER_WORDS: &[&str] = &[
    "потратил",
    "потратила",
    "потратили",
    "заплатил",
    "заплатила",
    "купил",
    "купила",
    "на",
    "за",
    "spent",
    "paid",
    "for",
    "on",
    "bought",
];

/// Thousands separators accepted inside numbers.
const GROUP_SEPARATORS: &[char] = &[' ', '\u{00A0}', '\u{2009}', '\u{202F}'];

/// One amount found in a piece of text.
#[derive(Debug, Clone, PartialEq)]
struct AmountToken {
    start: usize,
    end: usize,
    value: Decimal,
}

/// A slice of the message with its amount, if it has one.
#[derive(Debug, Clone)]
struct Piece {
    raw: String,
    amount: Option<Decimal>,
}

/// Extract transaction candidates from one message.
///
/// # Errors
///
/// - [`ParseError::Empty`] for empty or whitespace-only text.
/// - [`ParseError::TooLong`] above [`MAX_MESSAGE_CHARS`].
/// - [`ParseError::NoAmount`] when no fragment carries a non-zero amount.
pub fn extract(text: &str) -> Result<Vec<TransactionCandidate>, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let len = text.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(ParseError::TooLong {
            len,
            max: MAX_MESSAGE_CHARS,
        });
    }

    let normalized = join_digit_groups(text);
    let pieces: Vec<Piece> = split_segments(&normalized)
        .into_iter()
        .flat_map(|segment| CONJUNCTION_RE.split(segment).collect::<Vec<_>>())
        .flat_map(split_on_amounts)
        .collect();

    let candidates: Vec<TransactionCandidate> = merge_amountless(pieces)
        .into_iter()
        .filter_map(|piece| {
            let amount = piece.amount?;
            let description = clean_description(&piece.raw);
            Some(TransactionCandidate::new(piece.raw, amount, description))
        })
        .collect();

    if candidates.is_empty() {
        return Err(ParseError::NoAmount);
    }
    Ok(candidates)
}

/// First non-zero amount in `text`, if any.
///
/// Accepts the same grammar as [`extract`]: thousands groups, decimal
/// comma or point, `к`/`тыс`/`т.` multipliers and currency marks.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    find_amounts(&join_digit_groups(text)).into_iter().next().map(|t| t.value)
}

/// Strip amounts, currency marks and filler words, collapsing whitespace.
pub fn clean_description(text: &str) -> String {
    let mut without_amounts = String::with_capacity(text.len());
    let mut last = 0;
    for span in amount_matches(text).iter().filter_map(|caps| caps.get(0)) {
        without_amounts.push_str(&text[last..span.start()]);
        without_amounts.push(' ');
        last = span.end();
    }
    without_amounts.push_str(&text[last..]);
    let without_currency = CURRENCY_WORD_RE.replace_all(&without_amounts, " ");

    let words: Vec<&str> = without_currency
        .split_whitespace()
        .filter(|word| {
            let bare = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            !bare.is_empty() && !FILLER_WORDS.contains(&bare.as_str())
        })
        .collect();

    words
        .join(" ")
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | ';' | ':' | '-' | '–' | '—'))
        .to_string()
}

// ── Amounts ──────────────────────────────────────────────────────────────

/// Amount-shaped matches, minus those inside a clock time.
fn amount_matches(text: &str) -> Vec<Captures<'_>> {
    let clocks: Vec<Range<usize>> = CLOCK_RE.find_iter(text).map(|m| m.range()).collect();
    AMOUNT_RE
        .captures_iter(text)
        .filter(|caps| {
            caps.get(0)
                .is_some_and(|m| !clocks.iter().any(|c| m.start() < c.end && c.start < m.end()))
        })
        .collect()
}

fn find_amounts(text: &str) -> Vec<AmountToken> {
    amount_matches(text)
        .iter()
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let value = amount_value(caps)?;
            Some(AmountToken {
                start: whole.start(),
                end: whole.end(),
                value,
            })
        })
        .collect()
}

fn amount_value(caps: &Captures<'_>) -> Option<Decimal> {
    let int = caps.name("int")?.as_str();
    let number = match caps.name("frac").map(|m| m.as_str()) {
        Some(frac) if frac.len() <= 2 => format!("{int}.{frac}"),
        // "1,500" is a thousands separator, not a fraction.
        Some(frac) if frac.len() == 3 => format!("{int}{frac}"),
        _ => int.to_string(),
    };
    let mut value = Decimal::from_str(&number).ok()?;
    if caps.name("mult").is_some() {
        value = value.checked_mul(Decimal::ONE_THOUSAND)?;
    }
    (!value.is_zero()).then_some(value)
}

/// Remove separators inside thousands groups: "1 500 000" -> "1500000".
///
/// A separator is dropped only when it follows a run of 1–3 digits that is
/// not itself a decimal fraction, and precedes exactly three digits.
fn join_digit_groups(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());

    for (i, &ch) in chars.iter().enumerate() {
        if GROUP_SEPARATORS.contains(&ch) && is_group_separator(&chars, i) {
            continue;
        }
        out.push(ch);
    }
    out
}

fn is_group_separator(chars: &[char], i: usize) -> bool {
    let mut run_start = i;
    while run_start > 0 && chars[run_start - 1].is_ascii_digit() {
        run_start -= 1;
    }
    let run_len = i - run_start;
    if !(1..=3).contains(&run_len) {
        return false;
    }
    // Digits right after a decimal mark belong to a fraction.
    if run_start >= 2 && matches!(chars[run_start - 1], '.' | ',') && chars[run_start - 2].is_ascii_digit() {
        return false;
    }
    // Minutes of a clock time.
    if run_start >= 1 && chars[run_start - 1] == ':' {
        return false;
    }

    let next_three = chars.get(i + 1..i + 4);
    let followed_by_group = next_three.is_some_and(|g| g.iter().all(char::is_ascii_digit));
    let group_closed = chars.get(i + 4).is_none_or(|c| !c.is_ascii_digit());
    followed_by_group && group_closed
}

// ── Segmentation ─────────────────────────────────────────────────────────

/// Split on `;`, line breaks and commas that are not between two digits.
fn split_segments(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut segments = Vec::new();
    let mut start = 0;

    for (idx, &(pos, ch)) in chars.iter().enumerate() {
        let is_break = match ch {
            ';' | '\n' | '\r' => true,
            ',' => {
                let prev_digit = idx > 0 && chars[idx - 1].1.is_ascii_digit();
                let next_digit = chars.get(idx + 1).is_some_and(|(_, c)| c.is_ascii_digit());
                !(prev_digit && next_digit)
            }
            _ => false,
        };
        if is_break {
            segments.push(&text[start..pos]);
            start = pos + ch.len_utf8();
        }
    }
    segments.push(&text[start..]);
    segments.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

/// Cut a segment so that every piece holds at most one amount.
fn split_on_amounts(segment: &str) -> Vec<Piece> {
    let amounts = find_amounts(segment);
    let Some(first) = amounts.first() else {
        return vec![Piece {
            raw: segment.trim().to_string(),
            amount: None,
        }];
    };

    let description_first = !clean_description(&segment[..first.start]).is_empty();
    let mut pieces = Vec::with_capacity(amounts.len() + 1);

    if description_first {
        let mut cut = 0;
        for token in &amounts {
            pieces.push(Piece {
                raw: segment[cut..token.end].trim().to_string(),
                amount: Some(token.value),
            });
            cut = token.end;
        }
        push_amountless(&mut pieces, &segment[cut..]);
    } else {
        push_amountless(&mut pieces, &segment[..first.start]);
        for (i, token) in amounts.iter().enumerate() {
            let end = amounts.get(i + 1).map_or(segment.len(), |next| next.start);
            pieces.push(Piece {
                raw: segment[token.start..end].trim().to_string(),
                amount: Some(token.value),
            });
        }
    }
    pieces
}

fn push_amountless(pieces: &mut Vec<Piece>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        pieces.push(Piece {
            raw: trimmed.to_string(),
            amount: None,
        });
    }
}

/// Fold pieces without an amount into their neighbours.
fn merge_amountless(pieces: Vec<Piece>) -> Vec<Piece> {
    let mut merged: Vec<Piece> = Vec::with_capacity(pieces.len());
    let mut leading: Vec<String> = Vec::new();

    for piece in pieces {
        match (piece.amount, merged.last_mut()) {
            (Some(_), _) => {
                let mut piece = piece;
                if !leading.is_empty() {
                    leading.push(piece.raw);
                    piece.raw = leading.join(" ");
                    leading.clear();
                }
                merged.push(piece);
            }
            (None, Some(prev)) => {
                prev.raw.push(' ');
                prev.raw.push_str(&piece.raw);
            }
            (None, None) => leading.push(piece.raw),
        }
    }
    merged
}
