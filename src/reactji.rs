//! Reactji votes — maps emoji reactions onto signed point deltas.

use crate::config::ReactjiConfig;

/// Whether a reaction was put on or taken off an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionTransition {
    Added,
    Removed,
}

impl ReactionTransition {
    fn verb(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

/// Maps reaction events onto unit deltas.
///
/// Symmetric by construction: removing a reaction reverses what adding it
/// did. The upvote set is checked before the downvote set, so an emoji
/// configured in both counts as an upvote.
#[derive(Debug, Clone)]
pub struct VoteMapper {
    config: ReactjiConfig,
}

impl VoteMapper {
    pub fn new(config: ReactjiConfig) -> Self {
        Self { config }
    }

    /// The signed delta for a reaction event, or `None` when reactji votes
    /// are disabled or the emoji is not configured.
    pub fn delta(&self, reaction: &str, transition: ReactionTransition) -> Option<i64> {
        if !self.config.enabled {
            return None;
        }
        let vote = if self.config.upvote.contains(reaction) {
            1
        } else if self.config.downvote.contains(reaction) {
            -1
        } else {
            return None;
        };
        Some(match transition {
            ReactionTransition::Added => vote,
            ReactionTransition::Removed => -vote,
        })
    }

    /// The ledger reason recording who acted and how.
    pub fn reason(&self, actor: &str, reaction: &str, transition: ReactionTransition) -> String {
        format!("{actor} {} a :{reaction}: reactji", transition.verb())
    }
}
