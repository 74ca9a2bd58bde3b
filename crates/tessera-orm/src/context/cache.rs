//! Short-window de-duplication of identical selects.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::result::Row;

#[derive(Debug)]
struct Entry {
    results: Vec<Vec<Row>>,
    expires: Instant,
}

/// Rows of recently executed select batches, keyed by statement text.
///
/// A hit extends the entry's lifetime by one window. Every `clear` starts a
/// new generation; rows read during an older generation are never stored.
#[derive(Debug)]
pub(crate) struct SelectCache {
    window: Duration,
    generation: u64,
    entries: HashMap<String, Entry>,
}

impl SelectCache {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            generation: 0,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn get(&mut self, key: &str) -> Option<Vec<Vec<Row>>> {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires > now);
        let entry = self.entries.get_mut(key)?;
        entry.expires = now + self.window;
        Some(entry.results.clone())
    }

    pub(crate) const fn generation(&self) -> u64 {
        self.generation
    }

    /// Stores rows read while `generation` was current.
    pub(crate) fn insert(&mut self, key: String, results: Vec<Vec<Row>>, generation: u64) {
        if self.window.is_zero() || generation != self.generation {
            return;
        }
        let expires = Instant::now() + self.window;
        self.entries.insert(key, Entry { results, expires });
    }

    pub(crate) fn clear(&mut self) {
        self.generation += 1;
        self.entries.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
