//! Reading direction

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Reading direction for a session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadingDirection {
    /// Left to right, pages advance rightwards
    #[default]
    LeftToRight,

    /// Right to left (most manga), pages advance leftwards
    RightToLeft,

    /// Long-strip vertical scrolling
    Vertical,
}

impl ReadingDirection {
    /// Whether the display order of pages is the reverse of reading order
    pub fn is_reversed(self) -> bool {
        matches!(self, ReadingDirection::RightToLeft)
    }
}

impl FromStr for ReadingDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ltr" | "left_to_right" | "left-to-right" => Ok(ReadingDirection::LeftToRight),
            "rtl" | "right_to_left" | "right-to-left" => Ok(ReadingDirection::RightToLeft),
            "vertical" | "webtoon" => Ok(ReadingDirection::Vertical),
            other => Err(format!("unknown reading direction '{}'", other)),
        }
    }
}
