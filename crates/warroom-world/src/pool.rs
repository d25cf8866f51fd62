//! Arena free list for recyclable entity ids.

use crate::EntityId;

/// Hands out ids in `0..capacity`, reusing released ids first.
///
/// Owned by whichever subsystem creates and destroys entities of one
/// kind (units, for instance). The registry itself never frees ids.
#[derive(Debug, Clone)]
pub struct IdPool {
    capacity: u32,
    next_fresh: u32,
    free: Vec<EntityId>,
}

impl IdPool {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            next_fresh: 0,
            free: Vec::new(),
        }
    }

    /// The most recently released id, or the next never-used one.
    /// `None` once all `capacity` ids are live.
    pub fn allocate(&mut self) -> Option<EntityId> {
        if let Some(id) = self.free.pop() {
            return Some(id);
        }
        if self.next_fresh < self.capacity {
            let id = EntityId(self.next_fresh);
            self.next_fresh += 1;
            return Some(id);
        }
        None
    }

    /// Returns `id` to the pool. Releasing an id twice, or one that was
    /// never handed out, is ignored.
    pub fn release(&mut self, id: EntityId) {
        if id.0 >= self.next_fresh || self.free.contains(&id) {
            tracing::warn!(%id, "ignoring release of an id that is not live");
            return;
        }
        self.free.push(id);
    }

    /// Marks `id` as live, for pools rebuilt from existing state.
    pub fn reserve(&mut self, id: EntityId) {
        if id.0 >= self.capacity {
            return;
        }
        self.free.retain(|f| *f != id);
        while self.next_fresh <= id.0 {
            if self.next_fresh != id.0 {
                self.free.push(EntityId(self.next_fresh));
            }
            self.next_fresh += 1;
        }
    }

    /// Ids currently handed out.
    pub fn live(&self) -> usize {
        self.next_fresh as usize - self.free.len()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }
}
