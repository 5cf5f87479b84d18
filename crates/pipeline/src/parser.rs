//! Newsletter document parser.
//!
//! A document is a sequence of segments, each opened by a line that reads
//! `Article #<n>` and nothing else. The first lines of a segment carry the
//! title (`Article #<n> Title: ...`, required) and the link
//! (`Article #<n> URL: ...`, optional); everything after them is the body.
//! Text before the first heading is preamble and ignored.
//!
//! Parsing is a pure function of the input text. [`inspect`] produces the
//! non-fatal structure report shown by `cadence validate`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::{Article, ArticleIndex, ParseError};

// Literal patterns; `static_patterns_compile` forces every one of them.
static HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t]*article[ \t]*#[ \t]*(\d+)[ \t]*\r?$").expect("heading pattern")
});

static TITLE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:article\s*#\s*\d+\s+)?title\s*:(.*)$").expect("title pattern")
});

static URL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:article\s*#\s*\d+\s+)?url\s*:(.*)$").expect("url pattern")
});

static BLANK_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("blank-run pattern"));

/// Bodies shorter than this many words are reported by [`inspect`].
pub const SHORT_BODY_WORDS: usize = 50;

/// Splits raw document text into articles, in document order.
///
/// # Errors
///
/// - [`ParseError::NoArticles`] if the text contains no `Article #<n>` heading.
/// - [`ParseError::MissingTitle`] if a segment has no non-empty title line.
pub fn parse_document(text: &str) -> Result<Vec<Article>, ParseError> {
    let headings: Vec<(regex::Match<'_>, u32)> = HEADING
        .captures_iter(text)
        .filter_map(|captures| {
            let number = captures.get(1)?.as_str().parse::<u32>().unwrap_or(0);
            Some((captures.get(0)?, number))
        })
        .collect();
    if headings.is_empty() {
        return Err(ParseError::NoArticles);
    }

    let mut articles = Vec::with_capacity(headings.len());
    let mut index = ArticleIndex::FIRST;
    for (position, (heading, number)) in headings.iter().enumerate() {
        let end = headings
            .get(position + 1)
            .map_or(text.len(), |(next, _)| next.start());

        let article = parse_segment(index, *number, &text[heading.end()..end])?;
        articles.push(article);
        index = index.next();
    }

    tracing::debug!(articles = articles.len(), "document parsed");
    Ok(articles)
}

fn parse_segment(index: ArticleIndex, heading: u32, segment: &str) -> Result<Article, ParseError> {
    let mut title: Option<String> = None;
    let mut url: Option<String> = None;
    let mut lines = segment.lines().peekable();

    // Leading lines: blanks, one title line, one URL line, in any order.
    while let Some(line) = lines.peek() {
        if line.trim().is_empty() {
            lines.next();
        } else if title.is_none() && TITLE_LINE.is_match(line) {
            title = TITLE_LINE.captures(line).map(|c| c[1].trim().to_string());
            lines.next();
        } else if url.is_none() && URL_LINE.is_match(line) {
            url = URL_LINE
                .captures(line)
                .map(|c| c[1].trim().to_string())
                .filter(|u| !u.is_empty());
            lines.next();
        } else {
            break;
        }
    }

    let title = title
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingTitle {
            segment: index,
            heading,
        })?;

    let body = lines.collect::<Vec<_>>().join("\n");
    let body = BLANK_RUNS.replace_all(body.trim(), "\n\n").into_owned();

    Ok(Article::new(index, Some(heading), title, url, body))
}

// ---------------------------------------------------------------------------
// Structure report
// ---------------------------------------------------------------------------

/// A non-fatal structural problem in a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// Heading numbers are not consecutive.
    NumberingGap {
        article: ArticleIndex,
        expected: u32,
        found: u32,
    },
    MissingUrl {
        article: ArticleIndex,
    },
    InsecureUrl {
        article: ArticleIndex,
        url: String,
    },
    ShortBody {
        article: ArticleIndex,
        words: usize,
    },
    DuplicateUrl {
        url: String,
        articles: Vec<ArticleIndex>,
    },
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseWarning::NumberingGap {
                article,
                expected,
                found,
            } => write!(
                f,
                "article {article}: heading number gap, expected #{expected}, found #{found}"
            ),
            ParseWarning::MissingUrl { article } => write!(f, "article {article}: no URL"),
            ParseWarning::InsecureUrl { article, url } => {
                write!(f, "article {article}: URL is not https: {url}")
            }
            ParseWarning::ShortBody { article, words } => {
                write!(f, "article {article}: very short body ({words} words)")
            }
            ParseWarning::DuplicateUrl { url, articles } => {
                let list = articles
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "URL {url} is shared by articles {list}")
            }
        }
    }
}

/// Totals and warnings for a parsed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    pub article_count: usize,
    pub articles_with_url: usize,
    pub total_words: usize,
    pub warnings: Vec<ParseWarning>,
}

impl DocumentReport {
    /// Returns `true` if nothing was flagged.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Checks a parsed document for problems that do not stop parsing.
pub fn inspect(articles: &[Article]) -> DocumentReport {
    let mut warnings = Vec::new();
    let mut expected = 1;
    let mut by_url: BTreeMap<&str, Vec<ArticleIndex>> = BTreeMap::new();

    for article in articles {
        if let Some(found) = article.heading_number {
            if found != expected {
                warnings.push(ParseWarning::NumberingGap {
                    article: article.index,
                    expected,
                    found,
                });
            }
            expected = found + 1;
        }

        match article.url.as_deref() {
            None => warnings.push(ParseWarning::MissingUrl {
                article: article.index,
            }),
            Some(url) => {
                if !url.starts_with("https://") {
                    warnings.push(ParseWarning::InsecureUrl {
                        article: article.index,
                        url: url.to_string(),
                    });
                }
                by_url.entry(url).or_default().push(article.index);
            }
        }

        let words = article.word_count();
        if words < SHORT_BODY_WORDS {
            warnings.push(ParseWarning::ShortBody {
                article: article.index,
                words,
            });
        }
    }

    for (url, indices) in by_url {
        if indices.len() > 1 {
            warnings.push(ParseWarning::DuplicateUrl {
                url: url.to_string(),
                articles: indices,
            });
        }
    }

    DocumentReport {
        article_count: articles.len(),
        articles_with_url: articles.iter().filter(|a| a.url.is_some()).count(),
        total_words: articles.iter().map(Article::word_count).sum(),
        warnings,
    }
}
