//! Chapter and volume ordinals

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A chapter or volume ordinal such as `12` or `12.5`.
///
/// Always finite, so the type has a total order and can key maps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ChapterNumber(f64);

impl ChapterNumber {
    /// Wrap a float, rejecting NaN and infinities
    pub fn new(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        // Fold -0.0 into 0.0 so equal numbers hash equally
        Some(Self(if value == 0.0 { 0.0 } else { value }))
    }

    /// Parse a catalog number string.
    ///
    /// Accepts `,` as a decimal separator. Anything unparseable is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        trimmed
            .replace(',', ".")
            .parse::<f64>()
            .ok()
            .and_then(Self::new)
    }

    /// Parse an optional catalog string, treating malformed input as absent
    pub fn parse_opt(raw: Option<&str>) -> Option<Self> {
        raw.and_then(Self::parse)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for ChapterNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ChapterNumber {}

impl PartialOrd for ChapterNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ChapterNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for ChapterNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // f64's Display is the shortest string that parses back to the same value
        write!(f, "{}", self.0)
    }
}

impl TryFrom<f64> for ChapterNumber {
    type Error = String;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("{} is not a finite chapter number", value))
    }
}

impl From<ChapterNumber> for f64 {
    fn from(number: ChapterNumber) -> Self {
        number.0
    }
}

impl From<u32> for ChapterNumber {
    fn from(value: u32) -> Self {
        Self(f64::from(value))
    }
}

/// Descending order where an absent number counts as +∞ (sorts first).
pub fn cmp_desc_absent_first(a: Option<ChapterNumber>, b: Option<ChapterNumber>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => b.cmp(&a),
    }
}

/// Descending order where an absent number sorts after every present one.
pub fn cmp_desc_absent_last(a: Option<ChapterNumber>, b: Option<ChapterNumber>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => b.cmp(&a),
    }
}

/// Ascending order where an absent number counts as −∞.
///
/// This is `Option`'s own ordering; the alias documents intent at call sites.
pub fn cmp_asc_absent_first(a: Option<ChapterNumber>, b: Option<ChapterNumber>) -> Ordering {
    a.cmp(&b)
}
