use crate::state::Item;
use serde::{Deserialize, Serialize};

/// Items whose download did not succeed, in insertion order, unique by URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureLedger {
    items: Vec<Item>,
}

impl FailureLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `item` unless an item with the same URL is already present.
    ///
    /// Returns `true` when the item was added.
    pub fn insert(&mut self, item: Item) -> bool {
        if self.contains(&item.url) {
            return false;
        }
        self.items.push(item);
        true
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.items.iter().any(|item| item.url == url)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Take every item out, leaving the ledger empty.
    pub fn take(&mut self) -> Vec<Item> {
        std::mem::take(&mut self.items)
    }

    /// Items ordered by failure time, most recent first.
    #[must_use]
    pub fn most_recent_first(&self) -> Vec<Item> {
        let mut items = self.items.clone();
        // Stable sort keeps insertion order between equal timestamps.
        items.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));
        items
    }
}

impl<'a> IntoIterator for &'a FailureLedger {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
