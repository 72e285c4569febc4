use alloc::vec::Vec;

use dynlist::ListWindow;
use serde_json::Value;

/// A plain `Vec` container for a materialized window.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VecWindow {
    items: Vec<Value>,
}

impl VecWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Value>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }

    pub fn into_items(self) -> Vec<Value> {
        self.items
    }
}

impl ListWindow for VecWindow {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn insert(&mut self, index: usize, items: Vec<Value>) -> bool {
        if index > self.items.len() {
            return false;
        }
        self.items.splice(index..index, items);
        true
    }

    fn remove(&mut self, index: usize, count: usize) -> bool {
        let Some(end) = index.checked_add(count) else {
            return false;
        };
        if end > self.items.len() {
            return false;
        }
        self.items.drain(index..end);
        true
    }

    fn replace(&mut self, index: usize, items: Vec<Value>) -> bool {
        let Some(end) = index.checked_add(items.len()) else {
            return false;
        };
        if end > self.items.len() {
            return false;
        }
        for (slot, item) in self.items[index..end].iter_mut().zip(items) {
            *slot = item;
        }
        true
    }
}
