//! Caller-controlled selection over the current result items.
//!
//! The selection is a derived structure: it only ever holds identity keys
//! that are present in the operation's item list, and it is re-intersected
//! with the surviving keys on the same update that changes the list. It
//! carries no ordering of its own; selected keys are reported in item
//! arrival order.

use std::collections::HashSet;

use crate::operation::ResultItem;

/// A set of selected identity keys, always a subset of the current items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    keys: HashSet<String>,
}

impl SelectionSet {
    /// Flips the selection state of `key`. Selecting a key that is not in
    /// `items` is a no-op; deselecting always works.
    pub fn toggle(&mut self, key: &str, items: &[ResultItem]) {
        if self.keys.remove(key) {
            return;
        }
        if items.iter().any(|item| item.key == key) {
            self.keys.insert(key.to_string());
        }
    }

    /// Selects every current item. An empty item list yields an empty
    /// selection.
    pub fn select_all(&mut self, items: &[ResultItem]) {
        self.keys = items.iter().map(|item| item.key.clone()).collect();
    }

    /// Clears the selection.
    pub fn deselect_all(&mut self) {
        self.keys.clear();
    }

    /// Intersects the selection with the keys present in `items`, dropping
    /// anything that disappeared from the result list.
    pub fn reconcile(&mut self, items: &[ResultItem]) {
        self.keys
            .retain(|key| items.iter().any(|item| &item.key == key));
    }

    pub fn is_selected(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Selected keys in the arrival order of `items`.
    pub fn selected_in_order(&self, items: &[ResultItem]) -> Vec<String> {
        items
            .iter()
            .filter(|item| self.keys.contains(&item.key))
            .map(|item| item.key.clone())
            .collect()
    }
}
