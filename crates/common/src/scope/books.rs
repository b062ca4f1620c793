//! Canonical book table
//!
//! The 66 books with testament membership and the short forms people
//! actually type ("Jn", "1 Cor", "Ps").

use serde::{Deserialize, Serialize};
use std::fmt;

/// Testament a book belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Testament {
    #[serde(rename = "OT")]
    Old,
    #[serde(rename = "NT")]
    New,
}

impl Testament {
    /// Normalized scope token value
    pub fn code(&self) -> &'static str {
        match self {
            Testament::Old => "OT",
            Testament::New => "NT",
        }
    }
}

impl fmt::Display for Testament {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug)]
pub struct BookInfo {
    pub name: &'static str,
    pub testament: Testament,
    pub aliases: &'static [&'static str],
}

macro_rules! book {
    ($name:expr, $t:ident, [$($alias:expr),*]) => {
        BookInfo { name: $name, testament: Testament::$t, aliases: &[$($alias),*] }
    };
}

pub static BOOKS: &[BookInfo] = &[
    book!("Genesis", Old, ["gen", "ge", "gn"]),
    book!("Exodus", Old, ["exod", "exo", "ex"]),
    book!("Leviticus", Old, ["lev", "lv"]),
    book!("Numbers", Old, ["num", "nm"]),
    book!("Deuteronomy", Old, ["deut", "dt"]),
    book!("Joshua", Old, ["josh", "jos"]),
    book!("Judges", Old, ["judg", "jdg"]),
    book!("Ruth", Old, ["rth", "ru"]),
    book!("1 Samuel", Old, ["1 sam", "1sam", "1 sa", "1sa"]),
    book!("2 Samuel", Old, ["2 sam", "2sam", "2 sa", "2sa"]),
    book!("1 Kings", Old, ["1 kgs", "1kgs", "1 ki", "1ki"]),
    book!("2 Kings", Old, ["2 kgs", "2kgs", "2 ki", "2ki"]),
    book!("1 Chronicles", Old, ["1 chr", "1chr", "1 ch", "1ch"]),
    book!("2 Chronicles", Old, ["2 chr", "2chr", "2 ch", "2ch"]),
    book!("Ezra", Old, ["ezr"]),
    book!("Nehemiah", Old, ["neh", "ne"]),
    book!("Esther", Old, ["esth", "est"]),
    book!("Job", Old, ["jb"]),
    book!("Psalms", Old, ["psalm", "ps", "psa", "pss"]),
    book!("Proverbs", Old, ["prov", "pro", "prv"]),
    book!("Ecclesiastes", Old, ["eccl", "ecc", "qoh"]),
    book!("Song of Solomon", Old, ["song of songs", "song", "sng", "sos"]),
    book!("Isaiah", Old, ["isa", "is"]),
    book!("Jeremiah", Old, ["jer", "je"]),
    book!("Lamentations", Old, ["lam", "la"]),
    book!("Ezekiel", Old, ["ezek", "ezk"]),
    book!("Daniel", Old, ["dan", "dn"]),
    book!("Hosea", Old, ["hos", "ho"]),
    book!("Joel", Old, ["jl"]),
    book!("Amos", Old, ["am"]),
    book!("Obadiah", Old, ["obad", "ob"]),
    book!("Jonah", Old, ["jon", "jnh"]),
    book!("Micah", Old, ["mic", "mc"]),
    book!("Nahum", Old, ["nah", "na"]),
    book!("Habakkuk", Old, ["hab", "hb"]),
    book!("Zephaniah", Old, ["zeph", "zep"]),
    book!("Haggai", Old, ["hag", "hg"]),
    book!("Zechariah", Old, ["zech", "zec"]),
    book!("Malachi", Old, ["mal", "ml"]),
    book!("Matthew", New, ["matt", "mat", "mt"]),
    book!("Mark", New, ["mrk", "mk"]),
    book!("Luke", New, ["luk", "lk"]),
    book!("John", New, ["jhn", "jn"]),
    book!("Acts", New, ["act", "ac"]),
    book!("Romans", New, ["rom", "rm"]),
    book!("1 Corinthians", New, ["1 cor", "1cor", "1 co", "1co"]),
    book!("2 Corinthians", New, ["2 cor", "2cor", "2 co", "2co"]),
    book!("Galatians", New, ["gal", "ga"]),
    book!("Ephesians", New, ["eph"]),
    book!("Philippians", New, ["phil", "php"]),
    book!("Colossians", New, ["col"]),
    book!("1 Thessalonians", New, ["1 thess", "1thess", "1 th", "1th"]),
    book!("2 Thessalonians", New, ["2 thess", "2thess", "2 th", "2th"]),
    book!("1 Timothy", New, ["1 tim", "1tim", "1 ti", "1ti"]),
    book!("2 Timothy", New, ["2 tim", "2tim", "2 ti", "2ti"]),
    book!("Titus", New, ["tit"]),
    book!("Philemon", New, ["phlm", "phm"]),
    book!("Hebrews", New, ["heb"]),
    book!("James", New, ["jas", "jm"]),
    book!("1 Peter", New, ["1 pet", "1pet", "1 pe", "1pe"]),
    book!("2 Peter", New, ["2 pet", "2pet", "2 pe", "2pe"]),
    book!("1 John", New, ["1 jn", "1jn", "1 jhn", "1jhn"]),
    book!("2 John", New, ["2 jn", "2jn", "2 jhn", "2jhn"]),
    book!("3 John", New, ["3 jn", "3jn", "3 jhn", "3jhn"]),
    book!("Jude", New, ["jud", "jde"]),
    book!("Revelation", New, ["rev", "re", "revelations"]),
];

/// Look a book up by canonical name or alias, ignoring case and periods
pub fn lookup_book(name: &str) -> Option<&'static BookInfo> {
    let key = normalize_book_key(name);
    if key.is_empty() {
        return None;
    }

    BOOKS.iter().find(|book| {
        book.name.eq_ignore_ascii_case(&key) || book.aliases.iter().any(|a| *a == key)
    })
}

/// Lowercase, drop periods, collapse whitespace, and join "I John"-style
/// roman ordinals to their digit form.
fn normalize_book_key(name: &str) -> String {
    let cleaned: String = name.replace('.', " ").to_lowercase();
    let mut parts: Vec<&str> = cleaned.split_whitespace().collect();

    if let Some(first) = parts.first_mut() {
        *first = match *first {
            "i" | "first" => "1",
            "ii" | "second" => "2",
            "iii" | "third" => "3",
            other => other,
        };
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixty_six_books() {
        assert_eq!(BOOKS.len(), 66);
        let old = BOOKS.iter().filter(|b| b.testament == Testament::Old).count();
        assert_eq!(old, 39);
    }

    #[test]
    fn test_lookup_by_alias_and_case() {
        assert_eq!(lookup_book("john").map(|b| b.name), Some("John"));
        assert_eq!(lookup_book("1 Cor.").map(|b| b.name), Some("1 Corinthians"));
        assert_eq!(lookup_book("II Kings").map(|b| b.name), Some("2 Kings"));
        assert_eq!(lookup_book("Psalm").map(|b| b.name), Some("Psalms"));
        assert!(lookup_book("grace").is_none());
    }

    #[test]
    fn test_book_testaments() {
        let testament = |name: &str| lookup_book(name).map(|b| b.testament);
        assert_eq!(testament("Genesis"), Some(Testament::Old));
        assert_eq!(testament("Rev"), Some(Testament::New));
        assert_eq!(testament(""), None);
    }
}
