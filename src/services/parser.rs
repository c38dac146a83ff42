//! Interpretation of free-text model output.
//!
//! The model is asked for two labeled lines (`理由：…` then `结果：TRUE|FALSE`)
//! but nothing enforces that, so parsing works in stages:
//!
//! 1. drop `<think>…</think>` spans (an unterminated one runs to the end)
//! 2. look for a labeled result (`结果：` / `Result:`) followed by TRUE or FALSE
//! 3. otherwise take the first standalone TRUE or FALSE word
//! 4. otherwise fail with an excerpt of the text
//!
//! The reason follows its own label (`理由：` / `Reason:`) up to the result
//! label. Without a reason label it is the text around the result token.

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Labels, lowercase. Matching is ASCII case-insensitive.
const RESULT_LABELS: [&str; 2] = ["结果", "result"];
const REASON_LABELS: [&str; 2] = ["理由", "reason"];

/// Markup models put around a labeled verdict, e.g. `**TRUE**` or `[FALSE]`.
const VERDICT_WRAPPERS: &[char] = &['*', '[', ']', '【', '】', '`', '"', '\''];

/// Substituted when the model gives a verdict without any explanation.
pub const NO_REASON_PLACEHOLDER: &str = "no details provided";

const EXCERPT_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub verdict: bool,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Parse Error: {excerpt}")]
pub struct ParseError {
    pub excerpt: String,
}

/// A `label [:：]` occurrence: where the label starts and where its value begins.
#[derive(Debug, Clone, Copy)]
struct Label {
    start: usize,
    value: usize,
}

/// Parse raw model output into a verdict and reason.
pub fn parse_output(raw: &str) -> Result<Verdict, ParseError> {
    let cleaned = strip_reasoning(raw);
    let cleaned = cleaned.trim();
    // ASCII lowercasing keeps byte offsets aligned with `cleaned`.
    let folded = cleaned.to_ascii_lowercase();

    let verdict = match find_labeled_verdict(&folded).or_else(|| find_bare_verdict(&folded)) {
        Some(verdict) => verdict,
        None => {
            return Err(ParseError {
                excerpt: cleaned.chars().take(EXCERPT_CHARS).collect(),
            })
        }
    };

    Ok(Verdict {
        verdict,
        reason: extract_reason(cleaned, &folded),
    })
}

/// Remove every think span from `raw`.
pub fn strip_reasoning(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find(THINK_OPEN) {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + THINK_OPEN.len()..];
        match after_open.find(THINK_CLOSE) {
            Some(close) => rest = &after_open[close + THINK_CLOSE.len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Earliest label from `labels` at or after byte `from` that is followed by a separator.
fn find_label(folded: &str, labels: &[&str], from: usize) -> Option<Label> {
    labels
        .iter()
        .filter_map(|label| {
            folded[from..].match_indices(label).find_map(|(i, _)| {
                let start = from + i;
                skip_separator(&folded[start + label.len()..]).map(|tail| Label {
                    start,
                    value: folded.len() - tail.len(),
                })
            })
        })
        .min_by_key(|label| label.start)
}

/// Verdict of the first result label whose value is TRUE or FALSE.
fn find_labeled_verdict(folded: &str) -> Option<bool> {
    let mut from = 0;
    while let Some(label) = find_label(folded, &RESULT_LABELS, from) {
        if let Some((verdict, _)) = leading_verdict(&folded[label.value..]) {
            return Some(verdict);
        }
        from = label.value;
    }
    None
}

/// After a label: optional whitespace, a colon (ASCII or full width), optional whitespace.
fn skip_separator(s: &str) -> Option<&str> {
    let s = s.trim_start();
    let s = s
        .strip_prefix(':')
        .or_else(|| s.strip_prefix('：'))?;
    Some(s.trim_start())
}

/// A verdict word at the start of `s`, possibly wrapped in markup, and the
/// byte length of the whole token.
fn leading_verdict(s: &str) -> Option<(bool, usize)> {
    let unwrapped = s.trim_start_matches(VERDICT_WRAPPERS);
    let (verdict, word) = if unwrapped.starts_with("true") {
        (true, "true".len())
    } else if unwrapped.starts_with("false") {
        (false, "false".len())
    } else {
        return None;
    };
    let rest = &unwrapped[word..];
    let closing = rest.len() - rest.trim_start_matches(VERDICT_WRAPPERS).len();
    Some((verdict, s.len() - unwrapped.len() + word + closing))
}

/// Earliest standalone `true` / `false` word.
fn find_bare_verdict(folded: &str) -> Option<bool> {
    let first_true = find_word(folded, "true");
    let first_false = find_word(folded, "false");
    match (first_true, first_false) {
        (Some(t), Some(f)) => Some(t < f),
        (Some(_), None) => Some(true),
        (None, Some(_)) => Some(false),
        (None, None) => None,
    }
}

fn find_word(haystack: &str, word: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    haystack.match_indices(word).map(|(i, _)| i).find(|&i| {
        let before = i.checked_sub(1).map(|j| bytes[j]);
        let after = bytes.get(i + word.len()).copied();
        !before.is_some_and(|b| b.is_ascii_alphanumeric())
            && !after.is_some_and(|b| b.is_ascii_alphanumeric())
    })
}

fn extract_reason(cleaned: &str, folded: &str) -> String {
    let reason = match find_label(folded, &REASON_LABELS, 0) {
        Some(reason) => {
            let end = find_label(folded, &RESULT_LABELS, reason.value)
                .map_or(cleaned.len(), |result| result.start);
            cleaned[reason.value..end].trim().to_string()
        }
        None => match find_label(folded, &RESULT_LABELS, 0) {
            Some(result) => {
                let token_end = result.value
                    + leading_verdict(&folded[result.value..]).map_or(0, |(_, len)| len);
                let before = cleaned[..result.start].trim();
                let after = cleaned[token_end..].trim();
                [before, after]
                    .iter()
                    .filter(|part| !part.is_empty())
                    .copied()
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            None => cleaned.to_string(),
        },
    };

    if reason.is_empty() {
        NO_REASON_PLACEHOLDER.to_string()
    } else {
        reason
    }
}
