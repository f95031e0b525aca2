//! Match result

use chrono::{DateTime, Utc};
use std::fmt;

/// Outcome of one search over the template library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Matching template, `None` when the finger is unknown
    pub template_id: Option<u16>,

    /// Match confidence, 0..=100
    pub confidence: u8,

    /// When the search completed
    pub timestamp: DateTime<Utc>,
}

impl MatchResult {
    /// Published id for "no match"
    pub const NO_MATCH_ID: i32 = -1;

    /// Highest confidence value
    pub const MAX_CONFIDENCE: u8 = 100;

    /// A hit on `template_id`; the module score is clamped to 0..=100
    pub fn hit(template_id: u16, score: u16) -> Self {
        Self {
            template_id: Some(template_id),
            confidence: score.min(u16::from(Self::MAX_CONFIDENCE)) as u8,
            timestamp: Utc::now(),
        }
    }

    /// A search that found nothing
    pub fn miss() -> Self {
        Self {
            template_id: None,
            confidence: 0,
            timestamp: Utc::now(),
        }
    }

    /// Check if a template matched
    pub fn is_match(&self) -> bool {
        self.template_id.is_some()
    }

    /// Template id as published to observers (`-1` for no match)
    pub fn id_or_sentinel(&self) -> i32 {
        self.template_id
            .map(i32::from)
            .unwrap_or(Self::NO_MATCH_ID)
    }
}

impl fmt::Display for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.template_id {
            Some(id) => write!(f, "Match[id: {}, confidence: {}]", id, self.confidence),
            None => write!(f, "Match[none]"),
        }
    }
}
