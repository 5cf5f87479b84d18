//! Post-hoc style filter for composed posts.
//!
//! Punctuation rules are rewritten in place; voice and contraction rules only
//! produce warnings, since rewriting them would change meaning.

use std::sync::LazyLock;

use regex::{Captures, Regex};

// Literal patterns; `static_patterns_compile` forces every one of them.
static DASHES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*[\x{2014}\x{2013}]\s*|\s+-\s+").expect("dash pattern"));

static REPEATED_BANG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!{2,}").expect("bang pattern"));

static REPEATED_QUESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\?{2,}").expect("question pattern"));

static AFTER_SEMICOLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";[ \t]*(\p{Ll})").expect("semicolon pattern"));

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("space pattern"));

static CONTRACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:\w+n['\x{2019}]t|\w+['\x{2019}](?:re|ve|ll|m|d)|(?:it|that|what|there|here|who|let)['\x{2019}]s)\b")
        .expect("contraction pattern")
});

static PASSIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:is|are|was|were|be|been|being)\s+(?:\w+ly\s+)?\w{2,}(?:ed|en)\b")
        .expect("passive pattern")
});

const QUOTE_PAIRS: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('\u{201C}', '\u{201D}'), ('\u{2018}', '\u{2019}')];

/// Something the filter noticed but did not rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StyleWarning {
    Contraction(String),
    PassiveVoice(String),
}

impl std::fmt::Display for StyleWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StyleWarning::Contraction(word) => write!(f, "contraction '{word}'"),
            StyleWarning::PassiveVoice(phrase) => write!(f, "possible passive voice '{phrase}'"),
        }
    }
}

/// Filtered text plus whatever was flagged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleReport {
    pub text: String,
    pub warnings: Vec<StyleWarning>,
}

/// Applies the style checklist to a post body.
pub fn apply(text: &str) -> StyleReport {
    let text = strip_wrapping_quotes(text.trim());
    let text = DASHES.replace_all(text, "; ");
    let text = REPEATED_BANG.replace_all(&text, "!");
    let text = REPEATED_QUESTION.replace_all(&text, "?");
    let text = AFTER_SEMICOLON.replace_all(&text, |caps: &Captures<'_>| {
        format!("; {}", caps[1].to_uppercase())
    });
    let text = SPACE_RUNS.replace_all(&text, " ");
    let text = text.trim().to_string();

    let mut warnings: Vec<StyleWarning> = CONTRACTION
        .find_iter(&text)
        .map(|m| StyleWarning::Contraction(m.as_str().to_string()))
        .collect();
    warnings.extend(
        PASSIVE
            .find_iter(&text)
            .map(|m| StyleWarning::PassiveVoice(m.as_str().to_string())),
    );

    StyleReport { text, warnings }
}

fn strip_wrapping_quotes(mut text: &str) -> &str {
    loop {
        let stripped = QUOTE_PAIRS.iter().find_map(|(open, close)| {
            text.strip_prefix(*open)
                .and_then(|rest| rest.strip_suffix(*close))
        });
        match stripped {
            Some(inner) => text = inner.trim(),
            None => return text,
        }
    }
}
