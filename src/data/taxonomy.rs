//! Vehicle class taxonomy
//!
//! Maps raw class labels onto the four classes models and strategies are partitioned by.
//! Historical exports use exact labels; live session feeds are noisier and go through
//! keyword matching instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical vehicle class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalClass {
    #[serde(rename = "GTP")]
    Gtp,
    #[serde(rename = "LMP2")]
    Lmp2,
    #[serde(rename = "GTD_PRO")]
    GtdPro,
    #[serde(rename = "GTD")]
    Gtd,
}

impl CanonicalClass {
    /// All classes in training order
    pub const ALL: [CanonicalClass; 4] = [Self::Gtp, Self::Lmp2, Self::GtdPro, Self::Gtd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gtp => "GTP",
            Self::Lmp2 => "LMP2",
            Self::GtdPro => "GTD_PRO",
            Self::Gtd => "GTD",
        }
    }

    /// Parse an exact canonical tag (e.g. "GTD_PRO")
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == tag)
    }
}

impl fmt::Display for CanonicalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Error for an unrecognized canonical tag
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown class tag: {0}")]
pub struct UnknownClassTag(pub String);

impl FromStr for CanonicalClass {
    type Err = UnknownClassTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s).ok_or_else(|| UnknownClassTag(s.to_string()))
    }
}

/// Class of a live entry: a canonical class, or the raw label when no keyword matched
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RaceClass {
    Canonical(CanonicalClass),
    Unmapped(String),
}

impl RaceClass {
    pub fn as_str(&self) -> &str {
        match self {
            RaceClass::Canonical(class) => class.as_str(),
            RaceClass::Unmapped(raw) => raw,
        }
    }

    pub fn canonical(&self) -> Option<CanonicalClass> {
        match self {
            RaceClass::Canonical(class) => Some(*class),
            RaceClass::Unmapped(_) => None,
        }
    }
}

impl fmt::Display for RaceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Keyword checks for live labels, evaluated first-match-wins.
///
/// The PRO keywords must stay ahead of the bare "GTD".
const LIVE_CLASS_KEYWORDS: [(&str, CanonicalClass); 5] = [
    ("GTP", CanonicalClass::Gtp),
    ("LMP2", CanonicalClass::Lmp2),
    ("GTD PRO", CanonicalClass::GtdPro),
    ("GTD_PRO", CanonicalClass::GtdPro),
    ("GTD", CanonicalClass::Gtd),
];

/// Exact-match table for historical result exports
const HISTORICAL_CLASS_MAP: [(&str, &str); 7] = [
    ("DPi", "GTP"),
    ("GTP", "GTP"),
    ("LMP2", "LMP2"),
    ("LMP3", "LMP2"),
    ("GTLM", "GTD_PRO"),
    ("GTD PRO", "GTD_PRO"),
    ("GTD", "GTD"),
];

/// Classify a live-feed class label by ordered keyword search
///
/// Unmatched labels are kept verbatim so the output is never empty for a non-empty input.
pub fn classify_live(raw_class: &str) -> RaceClass {
    let upper = raw_class.to_uppercase();

    LIVE_CLASS_KEYWORDS
        .iter()
        .find(|(keyword, _)| upper.contains(keyword))
        .map(|(_, class)| RaceClass::Canonical(*class))
        .unwrap_or_else(|| RaceClass::Unmapped(raw_class.to_string()))
}

/// Map a historical class label to its canonical tag (identity for unknown labels)
pub fn canonicalize_historical(raw_class: &str) -> String {
    HISTORICAL_CLASS_MAP
        .iter()
        .find(|(raw, _)| *raw == raw_class)
        .map(|(_, tag)| tag.to_string())
        .unwrap_or_else(|| raw_class.to_string())
}
