//! Per-reaction tally and percentage breakdown

use serde::{Deserialize, Serialize};

use crate::types::{FeedbackEntry, Reaction};

/// Count of entries per reaction, indexed by [`Reaction::index`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounts {
    pub counts: [u64; 4],
}

impl AggregateCounts {
    /// Tally a full entry set from scratch
    ///
    /// Entries whose stored reaction is outside the fixed set are skipped.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a FeedbackEntry>) -> Self {
        let mut counts = [0u64; 4];
        for entry in entries {
            if let Some(reaction) = entry.reaction() {
                counts[reaction.index()] += 1;
            }
        }
        Self { counts }
    }

    pub fn count(&self, reaction: Reaction) -> u64 {
        self.counts[reaction.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Rounded share of `reaction` in percent; 0 when nothing was submitted
    pub fn percentage(&self, reaction: Reaction) -> u8 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let pct = (self.count(reaction) as f64 / total as f64 * 100.0).round();
        pct.clamp(0.0, 100.0) as u8
    }

    pub fn percentages(&self) -> [u8; 4] {
        Reaction::ALL.map(|r| self.percentage(r))
    }

    /// One row per reaction, in display order
    pub fn breakdown(&self) -> Vec<ReactionShare> {
        let total = self.total();
        Reaction::ALL
            .iter()
            .map(|&reaction| ReactionShare {
                reaction,
                count: self.count(reaction),
                total,
                percent: self.percentage(reaction),
            })
            .collect()
    }
}

/// One reaction's share of the total
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionShare {
    pub reaction: Reaction,
    pub count: u64,
    pub total: u64,
    pub percent: u8,
}

impl ReactionShare {
    /// "3 out of 4 find the lecture **fast**"
    pub fn label(&self) -> String {
        format!(
            "{} out of {} find the lecture **{}**",
            self.count, self.total, self.reaction
        )
    }
}
