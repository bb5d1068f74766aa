//! Keyed pool of transient textures
//!
//! A released texture goes onto a free list and backs the next request with a
//! matching descriptor, even later in the same frame. The pool is generic over
//! the stored resource so backends can keep whatever they need (a handle into
//! their own texture arena, usually).

use std::collections::HashMap;

use crate::backend::{ScratchKey, TextureDesc};
use crate::error::BlurError;

struct PoolEntry<T> {
    desc: TextureDesc,
    resource: T,
}

pub struct ScratchPool<T> {
    active: HashMap<ScratchKey, PoolEntry<T>>,
    free: Vec<PoolEntry<T>>,
    allocations: usize,
}

impl<T> Default for ScratchPool<T> {
    fn default() -> Self {
        Self {
            active: HashMap::new(),
            free: Vec::new(),
            allocations: 0,
        }
    }
}

impl<T> ScratchPool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the texture for `key`, reusing released memory when a free
    /// entry has the same descriptor and calling `create` otherwise.
    pub fn acquire(
        &mut self,
        key: ScratchKey,
        desc: TextureDesc,
        create: impl FnOnce(&TextureDesc) -> Result<T, BlurError>,
    ) -> Result<&T, BlurError> {
        if self.active.contains_key(&key) {
            return Err(BlurError::ScratchInUse(key));
        }

        let entry = match self.free.iter().position(|entry| entry.desc == desc) {
            Some(index) => self.free.swap_remove(index),
            None => {
                let resource = create(&desc)?;
                self.allocations += 1;
                PoolEntry { desc, resource }
            }
        };

        Ok(&self.active.entry(key).or_insert(entry).resource)
    }

    pub fn release(&mut self, key: ScratchKey) -> Result<(), BlurError> {
        let entry = self.active.remove(&key).ok_or(BlurError::UnknownScratch(key))?;
        self.free.push(entry);
        Ok(())
    }

    pub fn get(&self, key: ScratchKey) -> Option<&T> {
        self.active.get(&key).map(|entry| &entry.resource)
    }

    /// Keys acquired and not yet released
    pub fn outstanding(&self) -> usize {
        self.active.len()
    }

    /// Total resources ever created by this pool
    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Drop every free entry, returning the resources so the owner can
    /// destroy them
    pub fn trim(&mut self) -> Vec<T> {
        self.free.drain(..).map(|entry| entry.resource).collect()
    }
}
