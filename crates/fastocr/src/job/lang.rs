use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Tesseract language packs accepted for OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    Eng,
    Fra,
    Dan,
    Nld,
    Fin,
    Deu,
    Hun,
    Ita,
    Nor,
    Por,
    Ron,
    Rus,
    Spa,
    Swe,
    Tur,
}

impl Lang {
    pub const ALL: [Lang; 15] = [
        Lang::Eng,
        Lang::Fra,
        Lang::Dan,
        Lang::Nld,
        Lang::Fin,
        Lang::Deu,
        Lang::Hun,
        Lang::Ita,
        Lang::Nor,
        Lang::Por,
        Lang::Ron,
        Lang::Rus,
        Lang::Spa,
        Lang::Swe,
        Lang::Tur,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Lang::Eng => "eng",
            Lang::Fra => "fra",
            Lang::Dan => "dan",
            Lang::Nld => "nld",
            Lang::Fin => "fin",
            Lang::Deu => "deu",
            Lang::Hun => "hun",
            Lang::Ita => "ita",
            Lang::Nor => "nor",
            Lang::Por => "por",
            Lang::Ron => "ron",
            Lang::Rus => "rus",
            Lang::Spa => "spa",
            Lang::Swe => "swe",
            Lang::Tur => "tur",
        }
    }

    /// Joins a language set the way ocrmypdf expects it (`eng+fra`).
    pub fn join(languages: &BTreeSet<Lang>) -> String {
        languages
            .iter()
            .map(Lang::code)
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for Lang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Lang {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Lang::ALL
            .iter()
            .copied()
            .find(|lang| lang.code() == wanted)
            .ok_or_else(|| JobError::UnknownLanguage(s.to_string()))
    }
}

/// Parses language codes into a set. Each item may itself be a `+` joined list.
pub fn parse_languages<I, S>(codes: I) -> Result<BTreeSet<Lang>, JobError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut languages = BTreeSet::new();
    for code in codes {
        for part in code.as_ref().split('+').filter(|p| !p.trim().is_empty()) {
            languages.insert(part.parse::<Lang>()?);
        }
    }

    if languages.is_empty() {
        return Err(JobError::NoLanguages);
    }
    Ok(languages)
}
