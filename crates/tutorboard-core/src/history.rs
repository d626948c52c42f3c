//! Bounded linear undo/redo history of full-surface snapshots.

use crate::raster::Surface;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum number of snapshots to keep.
pub const MAX_HISTORY: usize = 50;

/// A snapshot of the committed surface.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub surface: Surface,
    /// Milliseconds since the Unix epoch when the entry was pushed.
    pub timestamp: u64,
}

impl HistoryEntry {
    fn new(surface: Surface) -> Self {
        Self { surface, timestamp: now_millis() }
    }
}

/// Linear history with a current-position index.
///
/// The index always points at a valid entry: the history is seeded with the
/// blank surface, so the first real operation is undoable.
#[derive(Debug, Clone)]
pub struct History {
    entries: Vec<HistoryEntry>,
    index: usize,
    limit: usize,
}

impl History {
    /// Start a history whose oldest entry is `initial`.
    pub fn new(initial: Surface, limit: usize) -> Self {
        Self {
            entries: vec![HistoryEntry::new(initial)],
            index: 0,
            limit: limit.max(1),
        }
    }

    /// Record a new snapshot, discarding any redoable entries after the index.
    pub fn push(&mut self, surface: Surface) {
        self.entries.truncate(self.index + 1);
        self.entries.push(HistoryEntry::new(surface));
        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
            log::debug!("History full, dropped {excess} oldest snapshot(s)");
        }
        self.index = self.entries.len() - 1;
    }

    /// Step back one entry. Returns the snapshot to restore, or `None` at the oldest.
    pub fn undo(&mut self) -> Option<&Surface> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        Some(&self.entries[self.index].surface)
    }

    /// Step forward one entry. Returns the snapshot to restore, or `None` at the newest.
    pub fn redo(&mut self) -> Option<&Surface> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        Some(&self.entries[self.index].surface)
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The entry the index points at.
    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.index]
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgba;

    fn marked(n: u8) -> Surface {
        Surface::filled(1, 1, Rgba::new(n, 0, 0, 255))
    }

    #[test]
    fn test_undo_redo_walks_the_index() {
        let mut history = History::new(marked(0), MAX_HISTORY);
        history.push(marked(1));
        history.push(marked(2));

        assert_eq!(history.undo(), Some(&marked(1)));
        assert_eq!(history.undo(), Some(&marked(0)));
        assert_eq!(history.undo(), None);
        assert_eq!(history.index(), 0);

        assert_eq!(history.redo(), Some(&marked(1)));
        assert_eq!(history.redo(), Some(&marked(2)));
        assert_eq!(history.redo(), None);
    }

    #[test]
    fn test_push_truncates_future() {
        let mut history = History::new(marked(0), MAX_HISTORY);
        history.push(marked(1));
        history.push(marked(2));
        history.undo();
        history.push(marked(3));

        assert_eq!(history.len(), 3);
        assert!(!history.can_redo());
        assert_eq!(history.current().surface, marked(3));
        assert_eq!(history.undo(), Some(&marked(1)));
    }

    #[test]
    fn test_bounded_to_limit() {
        let mut history = History::new(marked(0), MAX_HISTORY);
        for n in 1..=60 {
            history.push(marked(n));
        }
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history.index(), MAX_HISTORY - 1);

        let mut steps = 0;
        while history.undo().is_some() {
            steps += 1;
        }
        assert_eq!(steps, MAX_HISTORY - 1);
        // Oldest retained snapshot is the 11th push.
        assert_eq!(history.current().surface, marked(11));
        // Further undos stay put.
        assert!(history.undo().is_none());
        assert_eq!(history.index(), 0);
    }

    #[test]
    fn test_entries_are_timestamped() {
        let history = History::new(marked(0), 5);
        assert!(history.current().timestamp > 0);
    }
}
