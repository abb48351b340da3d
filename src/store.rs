//! Call Store: the bounded, sorted arena of retained Calls
//!
//! Calls live in a slot arena (`Vec<Option<Slot>>`) so that [`CallHandle`]s
//! stay valid (or detectably stale, via the generation counter) across
//! insert/rotate/clear. `order` holds the current display order as a vector
//! of arena slot indices; `active` is a separate ordered, deduplicated list
//! of slot indices whose Call is in-progress.

use crate::call::{Call, CallHandle};
use crate::config::CaptureOptions;
use crate::sort::{self, SortField};

struct Slot {
    call: Call,
    generation: u64,
}

pub struct CallStore {
    arena: Vec<Option<Slot>>,
    free_slots: Vec<usize>,
    /// Display order: arena slot indices, kept sorted by the current
    /// comparator.
    order: Vec<usize>,
    /// Active-call order: arena slot indices whose Call is in-progress.
    active: Vec<usize>,
    next_generation: u64,
    last_index: u64,
    sort_by: SortField,
    sort_asc: bool,
    capture: CaptureOptions,
}

impl CallStore {
    pub fn new(capture: CaptureOptions, sort_by: SortField, sort_asc: bool) -> Self {
        CallStore {
            arena: Vec::new(),
            free_slots: Vec::new(),
            order: Vec::new(),
            active: Vec::new(),
            next_generation: 0,
            last_index: 0,
            sort_by,
            sort_asc,
            capture,
        }
    }

    pub fn capture(&self) -> &CaptureOptions {
        &self.capture
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }

    pub fn next_index(&mut self) -> u64 {
        self.last_index += 1;
        self.last_index
    }

    pub fn last_index(&self) -> u64 {
        self.last_index
    }

    fn handle_of(&self, slot: usize) -> CallHandle {
        CallHandle {
            slot,
            generation: self.arena[slot].as_ref().map(|s| s.generation).unwrap_or(0),
        }
    }

    fn resolve(&self, handle: CallHandle) -> Option<usize> {
        match self.arena.get(handle.slot) {
            Some(Some(slot)) if slot.generation == handle.generation => Some(handle.slot),
            _ => None,
        }
    }

    pub fn get(&self, handle: CallHandle) -> Option<&Call> {
        self.resolve(handle).map(|slot| &self.arena[slot].as_ref().unwrap().call)
    }

    pub fn get_mut(&mut self, handle: CallHandle) -> Option<&mut Call> {
        let slot = self.resolve(handle)?;
        Some(&mut self.arena[slot].as_mut().unwrap().call)
    }

    /// Puts a new Call into the arena and returns its handle, without
    /// touching `order`. Split out from `insert_sorted` so a caller can
    /// populate the Call (first message, streams, state) before it is
    /// placed into the sorted display list — `order` is never revisited
    /// after insertion except by an explicit `set_sort`, so a Call placed
    /// while still empty would keep a stale position for its whole life.
    pub fn allocate(&mut self, call: Call) -> CallHandle {
        let slot_index = match self.free_slots.pop() {
            Some(i) => i,
            None => {
                self.arena.push(None);
                self.arena.len() - 1
            }
        };
        let generation = self.next_generation;
        self.next_generation += 1;
        self.arena[slot_index] = Some(Slot { call, generation });
        self.handle_of(slot_index)
    }

    /// Inserts an already-allocated Call's slot into `order`, respecting the
    /// current sort comparator. No-op if the handle is stale or already
    /// placed.
    pub fn place_in_order(&mut self, handle: CallHandle) {
        let Some(slot_index) = self.resolve(handle) else { return };
        if self.order.contains(&slot_index) {
            return;
        }
        let pos = self.order.partition_point(|&other| {
            let ordering = sort::compare(
                &self.arena[other].as_ref().unwrap().call,
                &self.arena[slot_index].as_ref().unwrap().call,
                self.sort_by,
                self.sort_asc,
            );
            ordering != std::cmp::Ordering::Greater
        });
        self.order.insert(pos, slot_index);
    }

    /// Inserts a new Call respecting the current sort comparator and
    /// returns its handle. Does not check capacity — callers run `rotate`
    /// first per the admission algorithm. Convenience composition of
    /// `allocate` + `place_in_order` for callers (tests, single-shot
    /// insertion) that don't need the two-phase split the Message
    /// Correlator uses.
    pub fn insert_sorted(&mut self, call: Call) -> CallHandle {
        let handle = self.allocate(call);
        self.place_in_order(handle);
        handle
    }

    /// `mark_active`: idempotent insert into the active set.
    pub fn mark_active(&mut self, handle: CallHandle) {
        if let Some(slot) = self.resolve(handle) {
            if !self.active.contains(&slot) {
                self.active.push(slot);
            }
        }
    }

    /// `unmark_active`: idempotent removal from the active set.
    pub fn unmark_active(&mut self, handle: CallHandle) {
        if let Some(slot) = self.resolve(handle) {
            self.active.retain(|&s| s != slot);
        }
    }

    pub fn is_active(&self, handle: CallHandle) -> bool {
        match self.resolve(handle) {
            Some(slot) => self.active.contains(&slot),
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// The oldest unlocked call currently retained, by insertion order
    /// (i.e. ascending `index`), regardless of display sort order.
    pub fn oldest_unlocked(&self) -> Option<CallHandle> {
        self.order
            .iter()
            .copied()
            .filter(|&slot| !self.arena[slot].as_ref().unwrap().call.locked)
            .min_by_key(|&slot| self.arena[slot].as_ref().unwrap().call.index)
            .map(|slot| self.handle_of(slot))
    }

    /// `rotate`: evicts the oldest unlocked Call. No-op if every
    /// retained Call is locked, or if this store's `capture.rotate` is
    /// disabled. Returns the evicted Call-ID so the caller can clear its
    /// Call-ID Index entry too.
    pub fn rotate(&mut self) -> Option<String> {
        let handle = self.oldest_unlocked()?;
        self.remove(handle)
    }

    fn remove(&mut self, handle: CallHandle) -> Option<String> {
        let slot = self.resolve(handle)?;
        self.order.retain(|&s| s != slot);
        self.active.retain(|&s| s != slot);
        let removed = self.arena[slot].take()?;
        self.free_slots.push(slot);
        Some(removed.call.callid)
    }

    /// `set_sort`: re-sorts the display list in place. `active` is
    /// internal-only and is never re-sorted.
    pub fn set_sort(&mut self, by: SortField, asc: bool) {
        self.sort_by = by;
        self.sort_asc = asc;
        let arena = &self.arena;
        self.order.sort_by(|&a, &b| {
            sort::compare(
                &arena[a].as_ref().unwrap().call,
                &arena[b].as_ref().unwrap().call,
                by,
                asc,
            )
        });
    }

    pub fn sort_field(&self) -> SortField {
        self.sort_by
    }

    pub fn sort_ascending(&self) -> bool {
        self.sort_asc
    }

    /// `clear_hard`: drops everything.
    pub fn clear_hard(&mut self) {
        self.arena.clear();
        self.free_slots.clear();
        self.order.clear();
        self.active.clear();
    }

    /// `clear_soft`: retains only Calls for which `predicate` holds.
    pub fn clear_soft(&mut self, predicate: impl Fn(&Call) -> bool) {
        let to_remove: Vec<CallHandle> = self
            .order
            .iter()
            .copied()
            .filter(|&slot| !predicate(&self.arena[slot].as_ref().unwrap().call))
            .map(|slot| self.handle_of(slot))
            .collect();
        for handle in to_remove {
            self.remove(handle);
        }
    }

    /// `iterator`: lazy, ordered traversal in current sort order.
    pub fn iter(&self) -> impl Iterator<Item = &Call> + '_ {
        self.order.iter().map(move |&slot| &self.arena[slot].as_ref().unwrap().call)
    }

    /// Ordered traversal over only the active calls.
    pub fn iter_active(&self) -> impl Iterator<Item = &Call> + '_ {
        self.active.iter().map(move |&slot| &self.arena[slot].as_ref().unwrap().call)
    }

    /// All handles currently retained, in display order. Used by the Media
    /// Correlator, which must search streams across every call.
    pub fn handles(&self) -> impl Iterator<Item = CallHandle> + '_ {
        self.order.iter().map(move |&slot| self.handle_of(slot))
    }

    pub fn handle_for(&self, slot_for_call: &Call) -> Option<CallHandle> {
        self.order
            .iter()
            .copied()
            .find(|&slot| self.arena[slot].as_ref().unwrap().call.callid == slot_for_call.callid)
            .map(|slot| self.handle_of(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::Call;

    fn store(limit: usize) -> CallStore {
        let capture = CaptureOptions {
            limit,
            rotate: limit > 0,
            ..Default::default()
        };
        CallStore::new(capture, SortField::Index, true)
    }

    #[test]
    fn insert_sorted_keeps_index_order_by_default() {
        let mut s = store(0);
        let h1 = s.insert_sorted(Call::new(2, "b".into()));
        let h2 = s.insert_sorted(Call::new(1, "a".into()));
        let order: Vec<&str> = s.iter().map(|c| c.callid.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert!(s.get(h1).is_some());
        assert!(s.get(h2).is_some());
    }

    #[test]
    fn rotate_evicts_oldest_unlocked() {
        let mut s = store(2);
        s.insert_sorted(Call::new(1, "a".into()));
        s.insert_sorted(Call::new(2, "b".into()));
        let evicted = s.rotate();
        assert_eq!(evicted.as_deref(), Some("a"));
        assert_eq!(s.count(), 1);
    }

    #[test]
    fn rotate_skips_locked_calls() {
        let mut s = store(3);
        let h_a = s.insert_sorted(Call::new(1, "a".into()));
        s.insert_sorted(Call::new(2, "b".into()));
        s.get_mut(h_a).unwrap().locked = true;

        let evicted = s.rotate();
        assert_eq!(evicted.as_deref(), Some("b"));
        assert_eq!(s.count(), 1);
        assert!(s.get(h_a).is_some());
    }

    #[test]
    fn rotate_is_noop_when_all_locked() {
        let mut s = store(1);
        let h = s.insert_sorted(Call::new(1, "a".into()));
        s.get_mut(h).unwrap().locked = true;
        assert_eq!(s.rotate(), None);
        assert_eq!(s.count(), 1);
    }

    #[test]
    fn handle_becomes_invalid_after_eviction() {
        let mut s = store(1);
        let h = s.insert_sorted(Call::new(1, "a".into()));
        s.rotate();
        assert!(s.get(h).is_none());
    }

    #[test]
    fn mark_active_is_idempotent() {
        let mut s = store(0);
        let h = s.insert_sorted(Call::new(1, "a".into()));
        s.mark_active(h);
        s.mark_active(h);
        assert_eq!(s.active_count(), 1);
        s.unmark_active(h);
        assert_eq!(s.active_count(), 0);
    }

    #[test]
    fn clear_soft_retains_matching_calls_only() {
        let mut s = store(0);
        s.insert_sorted(Call::new(1, "a".into()));
        s.insert_sorted(Call::new(2, "b".into()));
        s.clear_soft(|c| c.callid == "b");
        let ids: Vec<&str> = s.iter().map(|c| c.callid.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn clear_hard_drops_everything() {
        let mut s = store(0);
        s.insert_sorted(Call::new(1, "a".into()));
        s.clear_hard();
        assert_eq!(s.count(), 0);
    }

    #[test]
    fn set_sort_reorders_display_list_but_not_active() {
        let mut s = store(0);
        let mut c1 = Call::new(1, "a".into());
        c1.from = "zz".into();
        let mut c2 = Call::new(2, "b".into());
        c2.from = "aa".into();
        s.insert_sorted(c1);
        s.insert_sorted(c2);

        s.set_sort(SortField::From, true);
        let ids: Vec<&str> = s.iter().map(|c| c.callid.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
