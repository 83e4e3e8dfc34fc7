//! Shared, bounded conversation history.
//!
//! One process-wide conversation guarded by a readers-writer lock. The lock
//! is only held for in-memory copy/append work, never across I/O.

use parking_lot::RwLock;
use tracing::debug;

use crate::models::chat::Turn;

pub struct HistoryStore {
    turns: RwLock<Vec<Turn>>,
    /// Zero or negative disables trimming.
    max_exchanges: i64,
}

impl HistoryStore {
    pub fn new(max_exchanges: i64) -> Self {
        Self {
            turns: RwLock::new(Vec::new()),
            max_exchanges,
        }
    }

    /// Append a turn and trim whole leading exchanges beyond the limit.
    pub fn append(&self, turn: Turn) {
        let mut turns = self.turns.write();
        turns.push(turn);

        let removed = trim_to_max_exchanges(&mut turns, self.max_exchanges);
        if removed > 0 {
            debug!(
                removed,
                remaining = turns.len(),
                "Trimmed conversation history"
            );
        }
    }

    /// Independent copy of the history as it was at one instant.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.read().clone()
    }

    pub fn clear(&self) {
        self.turns.write().clear();
        debug!("Conversation history cleared");
    }

    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }

    pub fn max_exchanges(&self) -> i64 {
        self.max_exchanges
    }
}

/// Count user turns immediately followed by an assistant turn.
pub fn count_exchanges(turns: &[Turn]) -> usize {
    exchange_starts(turns).count()
}

fn exchange_starts(turns: &[Turn]) -> impl Iterator<Item = usize> + '_ {
    turns
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[0].is_user() && pair[1].is_assistant())
        .map(|(i, _)| i)
}

/// Drop the oldest complete exchanges until at most `max_exchanges` remain.
///
/// The cut lands on the user turn opening the first retained exchange, so a
/// pair is never split and a trailing unmatched user turn always survives.
/// Returns the number of turns removed; running it twice is a no-op.
pub fn trim_to_max_exchanges(turns: &mut Vec<Turn>, max_exchanges: i64) -> usize {
    if max_exchanges <= 0 {
        return 0;
    }
    let max = usize::try_from(max_exchanges).unwrap_or(usize::MAX);

    let complete = count_exchanges(turns);
    if complete <= max {
        return 0;
    }

    let excess = complete - max;
    let start = exchange_starts(turns).nth(excess).unwrap_or(turns.len());
    turns.drain(..start);
    start
}
