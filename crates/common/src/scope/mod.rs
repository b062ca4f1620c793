//! Scope Classifier - maps a free-text reference onto a bounded query scope
//!
//! Classification rules, in priority order:
//! 1. Testament aliases and named groupings (`nt`, `old testament`, `gospels`) → testament
//! 2. Whole-corpus aliases (`bible`, `all`, empty) → corpus
//! 3. Contains a `chapter:verse` pattern → verse
//! 4. Ends in a bare trailing number → chapter
//! 5. Anything else → book
//!
//! A corpus scope never reaches a provider as-is: it expands to the two
//! testament tokens because upstream providers require a bounded scope.

mod books;

pub use books::{lookup_book, BookInfo, Testament, BOOKS};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Granularity of a reference scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Verse,
    Chapter,
    Book,
    Testament,
    Corpus,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Verse => "verse",
            ScopeKind::Chapter => "chapter",
            ScopeKind::Book => "book",
            ScopeKind::Testament => "testament",
            ScopeKind::Corpus => "corpus",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One bounded unit a provider can be queried with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeToken {
    pub kind: ScopeKind,
    pub value: String,
}

impl ScopeToken {
    pub fn new(kind: ScopeKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Query parameter carrying this token: testament-level tokens travel
    /// as `testament`, everything narrower as `reference`.
    pub fn query_param(&self) -> (&'static str, &str) {
        match self.kind {
            ScopeKind::Testament | ScopeKind::Corpus => ("testament", &self.value),
            _ => ("reference", &self.value),
        }
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// Result of classifying a reference string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedScope {
    /// Reference exactly as the caller supplied it
    pub raw: String,
    pub kind: ScopeKind,
    /// Tokens to dispatch; never contains a corpus-kind token
    pub tokens: Vec<ScopeToken>,
}

const OLD_TESTAMENT_ALIASES: &[&str] = &["ot", "old testament", "old", "hebrew bible", "tanakh"];
const NEW_TESTAMENT_ALIASES: &[&str] = &["nt", "new testament", "new"];
const CORPUS_ALIASES: &[&str] = &[
    "",
    "all",
    "bible",
    "the bible",
    "whole bible",
    "entire bible",
    "scripture",
    "scriptures",
];

/// Named groupings that behave like testaments
const GROUPINGS: &[(&[&str], &str)] = &[
    (&["gospels", "the gospels"], "Gospels"),
    (&["pentateuch", "torah", "law", "the law"], "Pentateuch"),
    (&["epistles", "letters"], "Epistles"),
    (&["prophets", "the prophets"], "Prophets"),
];

fn verse_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+\s*:\s*\d+").expect("verse pattern is valid"))
}

fn trailing_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s\d+$").expect("chapter pattern is valid"))
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<book>(?:[1-3]\s*)?[A-Za-z][A-Za-z. ]*?)\s*(?:(?P<chapter>\d+)(?:\s*:\s*(?P<verse>\d+)(?:\s*-\s*(?P<end>\d+))?)?)?$",
        )
        .expect("reference pattern is valid")
    })
}

/// Lowercase and collapse whitespace for alias comparison
fn alias_key(reference: &str) -> String {
    reference
        .trim()
        .trim_end_matches('.')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Collapse internal whitespace but keep the caller's casing
fn tidy(reference: &str) -> String {
    reference.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Testament value for an alias, if it is one
fn testament_alias(key: &str) -> Option<&'static str> {
    if OLD_TESTAMENT_ALIASES.contains(&key) {
        return Some(Testament::Old.code());
    }
    if NEW_TESTAMENT_ALIASES.contains(&key) {
        return Some(Testament::New.code());
    }
    GROUPINGS
        .iter()
        .find(|(aliases, _)| aliases.contains(&key))
        .map(|(_, name)| *name)
}

/// Classify a reference string into a scope and its dispatch tokens
pub fn classify(reference: &str) -> ClassifiedScope {
    let key = alias_key(reference);
    let raw = reference.to_string();

    // Rule 1 must run before rule 5 or "NT" would be treated as a book
    if let Some(value) = testament_alias(&key) {
        return ClassifiedScope {
            raw,
            kind: ScopeKind::Testament,
            tokens: vec![ScopeToken::new(ScopeKind::Testament, value)],
        };
    }

    if CORPUS_ALIASES.contains(&key.as_str()) {
        return ClassifiedScope {
            raw,
            kind: ScopeKind::Corpus,
            tokens: expand_corpus(),
        };
    }

    let value = tidy(reference);
    let kind = if verse_pattern().is_match(&value) {
        ScopeKind::Verse
    } else if trailing_number_pattern().is_match(&value) {
        ScopeKind::Chapter
    } else {
        ScopeKind::Book
    };

    ClassifiedScope {
        raw,
        kind,
        tokens: vec![ScopeToken::new(kind, value)],
    }
}

/// The two testament tokens covering the whole corpus
pub fn expand_corpus() -> Vec<ScopeToken> {
    vec![
        ScopeToken::new(ScopeKind::Testament, Testament::Old.code()),
        ScopeToken::new(ScopeKind::Testament, Testament::New.code()),
    ]
}

/// Structured view of a reference string such as "1 John 3:16-18"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedReference {
    /// Canonical book name
    pub book: String,
    pub testament: Testament,
    pub chapter: Option<u32>,
    pub verse: Option<u32>,
    pub verse_end: Option<u32>,
}

/// Best-effort parse of a reference; `None` unless the book is recognized
pub fn parse_reference(reference: &str) -> Option<ParsedReference> {
    let text = tidy(&reference.replace(['\u{2013}', '\u{2014}'], "-"));
    let caps = reference_pattern().captures(&text)?;

    let book = lookup_book(caps.name("book")?.as_str())?;
    let number = |name: &str| caps.name(name).and_then(|m| m.as_str().parse::<u32>().ok());

    Some(ParsedReference {
        book: book.name.to_string(),
        testament: book.testament,
        chapter: number("chapter"),
        verse: number("verse"),
        verse_end: number("end"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_testament_aliases() {
        for reference in ["NT", "nt", "New Testament", "  new   testament "] {
            let scope = classify(reference);
            assert_eq!(scope.kind, ScopeKind::Testament, "{reference}");
            assert_eq!(scope.tokens, vec![ScopeToken::new(ScopeKind::Testament, "NT")]);
        }
    }

    #[test]
    fn test_old_testament_and_groupings() {
        assert_eq!(classify("Old Testament").tokens[0].value, "OT");
        let gospels = classify("Gospels");
        assert_eq!(gospels.kind, ScopeKind::Testament);
        assert_eq!(gospels.tokens[0].value, "Gospels");
        assert_eq!(classify("torah").tokens[0].value, "Pentateuch");
    }

    #[test]
    fn test_corpus_expands_to_two_testaments() {
        for reference in ["Bible", "all", "", "  "] {
            let scope = classify(reference);
            assert_eq!(scope.kind, ScopeKind::Corpus);
            assert_eq!(scope.tokens.len(), 2);
            assert_eq!(scope.tokens[0].value, "OT");
            assert_eq!(scope.tokens[1].value, "NT");
            assert!(scope.tokens.iter().all(|t| t.kind == ScopeKind::Testament));
        }
    }

    #[test]
    fn test_verse_scope() {
        for reference in ["John 3:16", "1 John 4:8", "Genesis 1:1-3", "Ps 23 : 1"] {
            assert_eq!(classify(reference).kind, ScopeKind::Verse, "{reference}");
        }
    }

    #[test]
    fn test_chapter_and_book_scope() {
        assert_eq!(classify("Romans 8").kind, ScopeKind::Chapter);
        assert_eq!(classify("Romans").kind, ScopeKind::Book);
        // Leading ordinal is not a trailing chapter number
        assert_eq!(classify("1 John").kind, ScopeKind::Book);
        assert_eq!(classify("Song of Solomon").kind, ScopeKind::Book);
    }

    #[test]
    fn test_single_token_keeps_caller_casing() {
        let scope = classify("  romans   8 ");
        assert_eq!(scope.raw, "  romans   8 ");
        assert_eq!(scope.tokens, vec![ScopeToken::new(ScopeKind::Chapter, "romans 8")]);
    }

    #[test]
    fn test_query_param_per_kind() {
        let verse = ScopeToken::new(ScopeKind::Verse, "John 3:16");
        assert_eq!(verse.query_param(), ("reference", "John 3:16"));
        let nt = ScopeToken::new(ScopeKind::Testament, "NT");
        assert_eq!(nt.query_param(), ("testament", "NT"));
    }

    #[test]
    fn test_parse_reference() {
        let parsed = parse_reference("1 John 3:16-18").unwrap();
        assert_eq!(parsed.book, "1 John");
        assert_eq!(parsed.testament, Testament::New);
        assert_eq!(parsed.chapter, Some(3));
        assert_eq!(parsed.verse, Some(16));
        assert_eq!(parsed.verse_end, Some(18));

        let chapter = parse_reference("Psalm 23").unwrap();
        assert_eq!(chapter.book, "Psalms");
        assert_eq!(chapter.chapter, Some(23));
        assert_eq!(chapter.verse, None);

        let book = parse_reference("Song of Solomon").unwrap();
        assert_eq!(book.chapter, None);
    }

    #[test]
    fn test_parse_reference_rejects_unknown_books() {
        assert!(parse_reference("grace").is_none());
        assert!(parse_reference("Figures of Speech").is_none());
        assert!(parse_reference("").is_none());
    }
}
