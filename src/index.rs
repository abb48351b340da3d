//! Call-ID Index: O(1) Call-ID to Call lookup
//!
//! The index holds [`CallHandle`]s, not owning references — the Call Store's
//! arena owns Call storage; removing an index entry never frees a Call.

use std::collections::HashMap;

use crate::call::CallHandle;

#[derive(Debug, Default)]
pub struct CallIdIndex {
    map: HashMap<String, CallHandle>,
}

impl CallIdIndex {
    pub fn new() -> Self {
        CallIdIndex { map: HashMap::new() }
    }

    pub fn insert(&mut self, callid: String, handle: CallHandle) {
        self.map.insert(callid, handle);
    }

    pub fn remove(&mut self, callid: &str) {
        self.map.remove(callid);
    }

    pub fn lookup(&self, callid: &str) -> Option<CallHandle> {
        self.map.get(callid).copied()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(slot: usize) -> CallHandle {
        CallHandle { slot, generation: 0 }
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut idx = CallIdIndex::new();
        idx.insert("abc".into(), handle(1));
        assert_eq!(idx.lookup("abc"), Some(handle(1)));
    }

    #[test]
    fn remove_clears_lookup_but_not_the_call_itself() {
        let mut idx = CallIdIndex::new();
        idx.insert("abc".into(), handle(1));
        idx.remove("abc");
        assert_eq!(idx.lookup("abc"), None);
    }

    #[test]
    fn clear_drops_all_entries() {
        let mut idx = CallIdIndex::new();
        idx.insert("a".into(), handle(1));
        idx.insert("b".into(), handle(2));
        idx.clear();
        assert!(idx.is_empty());
    }
}
