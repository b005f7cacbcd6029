//! Core data types for classpulse
//!
//! Reactions, feedback entries and the identifiers that scope them. These types
//! are shared by the storage backends, the aggregation pipeline and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PulseError;

/// Reaction a participant can submit about the lecture
///
/// The set is closed: these four values are the only ones this crate writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reaction {
    Fast,
    Slow,
    Confusing,
    Good,
}

impl Reaction {
    /// All reactions in display order
    pub const ALL: [Reaction; 4] = [
        Reaction::Fast,
        Reaction::Slow,
        Reaction::Confusing,
        Reaction::Good,
    ];

    /// Position of this reaction in the count vector
    pub fn index(self) -> usize {
        match self {
            Reaction::Fast => 0,
            Reaction::Slow => 1,
            Reaction::Confusing => 2,
            Reaction::Good => 3,
        }
    }

    /// Wire/storage name
    pub fn as_str(self) -> &'static str {
        match self {
            Reaction::Fast => "fast",
            Reaction::Slow => "slow",
            Reaction::Confusing => "confusing",
            Reaction::Good => "good",
        }
    }

    /// Bar variant used when rendering this reaction
    pub fn variant(self) -> &'static str {
        match self {
            Reaction::Fast => "danger",
            Reaction::Slow => "info",
            Reaction::Confusing => "warning",
            Reaction::Good => "success",
        }
    }
}

impl std::fmt::Display for Reaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Reaction {
    /// Exact match against a stored value
    ///
    /// Stored values are not normalised: `"FAST"` or `" fast "` are not
    /// reactions and are left out of the tally.
    pub fn from_stored(s: &str) -> Option<Reaction> {
        Reaction::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

/// Lenient parse for user input (trimmed, case-insensitive)
impl FromStr for Reaction {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(Reaction::Fast),
            "slow" => Ok(Reaction::Slow),
            "confusing" => Ok(Reaction::Confusing),
            "good" => Ok(Reaction::Good),
            other => Err(PulseError::InvalidReaction(other.to_string())),
        }
    }
}

/// Identifier of a class (lecture session scope)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub String);

impl ClassId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque key of a feedback entry
///
/// Entries created here get a random UUID, so two submissions landing in the
/// same clock tick never share a key. Keys written by other clients of the
/// store are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub String);

impl EntryId {
    /// Create a new random entry ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing key
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One submitted reaction
///
/// `reaction` holds the stored string. Entries written by other clients of the
/// same store may carry values outside [`Reaction`]; those are kept as-is and
/// ignored by aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: EntryId,
    pub class_id: ClassId,
    pub reaction: String,
    pub submitter: String,
    pub created_at: DateTime<Utc>,
}

impl FeedbackEntry {
    /// Build a fresh entry with a new random ID
    pub fn new(class_id: ClassId, reaction: Reaction, submitter: impl Into<String>) -> Self {
        Self {
            id: EntryId::new(),
            class_id,
            reaction: reaction.as_str().to_string(),
            submitter: submitter.into(),
            created_at: Utc::now(),
        }
    }

    /// Typed reaction, or `None` for a value outside the fixed set
    pub fn reaction(&self) -> Option<Reaction> {
        Reaction::from_stored(&self.reaction)
    }
}
