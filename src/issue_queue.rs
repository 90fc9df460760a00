use crate::{
    error::SimError,
    inst::{RenamedInst, Tagged, UnitKind},
};

/// Renamed non-memory instructions waiting for their operands. Entries stay in
/// arrival order, which is program order.
#[derive(Debug, Clone)]
pub struct IssueQueue {
    entries: Vec<Tagged<RenamedInst>>,
    capacity: usize,
}

impl IssueQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, entry: Tagged<RenamedInst>) -> Result<(), SimError> {
        if self.is_full() {
            return Err(SimError::IssueQueueFull);
        }

        debug_assert!(self.entries.last().map_or(true, |e| e.tag < entry.tag));
        self.entries.push(entry);
        Ok(())
    }

    /// Position of the oldest entry bound for `unit` that `is_ready` accepts.
    /// Younger ready entries win over older stalled ones.
    pub fn select<F>(&self, unit: UnitKind, is_ready: F) -> Option<usize>
    where
        F: Fn(&Tagged<RenamedInst>) -> bool,
    {
        self.entries
            .iter()
            .position(|e| e.inst.inst.opcode.unit() == unit && is_ready(e))
    }

    pub fn get(&self, index: usize) -> &Tagged<RenamedInst> {
        &self.entries[index]
    }

    pub fn remove(&mut self, index: usize) -> Tagged<RenamedInst> {
        self.entries.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tagged<RenamedInst>> {
        self.entries.iter()
    }
}
