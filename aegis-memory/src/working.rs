//! Working memory: a bounded FIFO scratchpad cleared at session end (spec
//! §4.4). Default capacity 10.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct WorkingItem {
    pub text: String,
    pub metadata: std::collections::HashMap<String, serde_json::Value>,
}

#[derive(Debug)]
pub struct WorkingStore {
    capacity: usize,
    items: parking_lot::RwLock<VecDeque<WorkingItem>>,
}

impl WorkingStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            items: parking_lot::RwLock::new(VecDeque::new()),
        }
    }

    /// Push an item, evicting the oldest if the store is at capacity.
    pub fn push(&self, item: WorkingItem) {
        let mut items = self.items.write();
        if items.len() >= self.capacity {
            items.pop_front();
        }
        items.push_back(item);
    }

    pub fn items(&self) -> Vec<WorkingItem> {
        self.items.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Clear the scratchpad. Called when a session ends.
    pub fn clear(&self) {
        self.items.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn item(text: &str) -> WorkingItem {
        WorkingItem {
            text: text.to_string(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let store = WorkingStore::new(2);
        store.push(item("a"));
        store.push(item("b"));
        store.push(item("c"));
        let items: Vec<String> = store.items().into_iter().map(|i| i.text).collect();
        assert_eq!(items, vec!["b", "c"]);
    }

    #[test]
    fn clear_empties_the_store() {
        let store = WorkingStore::new(10);
        store.push(item("a"));
        store.clear();
        assert!(store.is_empty());
    }
}
