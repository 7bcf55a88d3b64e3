//! Stop-word language detection

use std::collections::HashSet;

/// Languages the pipeline can answer in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Language {
    /// English (fallback)
    #[default]
    En,
    /// Italian
    It,
    /// Spanish
    Es,
    /// French
    Fr,
    /// German
    De,
}

const ITALIAN: &[&str] = &[
    "il", "lo", "la", "gli", "le", "di", "da", "in", "con", "su", "per", "tra", "fra", "che",
    "non", "sono", "è", "ho", "ha", "abbiamo", "hanno", "come", "perché", "quando", "chi",
    "quale", "questo", "quello", "un", "una", "uno", "filtro", "olio", "macchina", "casa",
    "lavoro", "fare", "dire", "potere", "volere",
];

const SPANISH: &[&str] = &[
    "el", "la", "los", "las", "de", "en", "con", "por", "para", "que", "no", "son", "es",
    "tengo", "tiene", "tenemos", "tienen", "como", "porque", "cuando", "quien", "cual", "este",
    "ese", "hacer", "decir", "poder", "querer", "un", "una", "uno",
];

const FRENCH: &[&str] = &[
    "le", "la", "les", "de", "en", "avec", "par", "pour", "est", "que", "ne", "sont", "ai", "as",
    "avons", "avez", "ont", "comment", "pourquoi", "quand", "qui", "quel", "ce", "cette",
    "faire", "dire", "pouvoir", "vouloir", "un", "une",
];

const GERMAN: &[&str] = &[
    "der", "die", "das", "den", "dem", "des", "ein", "eine", "und", "ist", "nicht", "habe",
    "hat", "haben", "wie", "warum", "wann", "wer", "welcher", "dieser", "jener", "machen",
    "sagen", "können", "wollen",
];

impl Language {
    /// Candidates scored by [`Language::detect`]
    const SCORED: [(Self, &'static [&'static str]); 4] = [
        (Self::It, ITALIAN),
        (Self::Es, SPANISH),
        (Self::Fr, FRENCH),
        (Self::De, GERMAN),
    ];

    /// Guess the language of `text`
    ///
    /// Counts distinct lower-cased words of at least two characters that are
    /// stop words of each language. No match, or a tie for the best score,
    /// gives English.
    #[must_use]
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words: HashSet<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() >= 2)
            .collect();

        let scores: Vec<(Self, usize)> = Self::SCORED
            .iter()
            .map(|(lang, stop)| (*lang, stop.iter().filter(|w| words.contains(*w)).count()))
            .collect();

        let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
        if best == 0 {
            return Self::En;
        }
        let mut leaders = scores.iter().filter(|(_, s)| *s == best);
        match (leaders.next(), leaders.next()) {
            (Some((lang, _)), None) => *lang,
            _ => Self::En,
        }
    }

    /// English name of the language, as used in instructions
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::It => "Italian",
            Self::Es => "Spanish",
            Self::Fr => "French",
            Self::De => "German",
        }
    }

    /// ISO 639-1 code
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::It => "it",
            Self::Es => "es",
            Self::Fr => "fr",
            Self::De => "de",
        }
    }

    /// Parse an ISO 639-1 code; unknown codes give English
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "it" => Self::It,
            "es" => Self::Es,
            "fr" => Self::Fr,
            "de" => Self::De,
            _ => Self::En,
        }
    }
}
