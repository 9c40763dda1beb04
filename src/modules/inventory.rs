use serde::Serialize;

use crate::modules::belief::BeliefStore;
use crate::modules::block::BlockId;
use crate::modules::grid::Cell;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CarriedBlock {
    pub block_id: BlockId,
    /// Slot the block is headed for, if it holds a claim.
    pub priority: Option<usize>,
    pub slot_location: Option<Cell>,
}

/// Blocks the local agent holds, most urgent first.
#[derive(Clone, Debug, Serialize)]
pub struct Inventory {
    items: Vec<CarriedBlock>,
    capacity: usize,
}

impl Inventory {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn contains(&self, block_id: &str) -> bool {
        self.items.iter().any(|c| c.block_id == block_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CarriedBlock> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&CarriedBlock> {
        self.items.first()
    }

    /// Adds a block. Returns false when full or already held.
    pub fn push(&mut self, block_id: impl Into<BlockId>) -> bool {
        let block_id = block_id.into();
        if self.is_full() || self.contains(&block_id) {
            return false;
        }
        self.items.push(CarriedBlock {
            block_id,
            priority: None,
            slot_location: None,
        });
        true
    }

    pub fn remove(&mut self, block_id: &str) -> Option<CarriedBlock> {
        let idx = self.items.iter().position(|c| c.block_id == block_id)?;
        Some(self.items.remove(idx))
    }

    /// Re-reads destinations from the store's claims and re-sorts, so claims
    /// lost to a teammate show up as blocks without a destination.
    pub fn refresh(&mut self, store: &BeliefStore) {
        for item in &mut self.items {
            let slot = store.slot_for_block(&item.block_id);
            item.priority = slot.map(|s| s.priority);
            item.slot_location = slot.map(|s| s.location);
        }
        self.items
            .sort_by_key(|c| (c.priority.is_none(), c.priority));
    }
}
