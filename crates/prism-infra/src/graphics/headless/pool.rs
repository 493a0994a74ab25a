// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Id-keyed resource storage shared by every resource kind of the headless device.

use ahash::AHashMap;
use prism_core::renderer::ResourceError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// A thread-safe map from raw ids to resource entries, with its own id generator.
#[derive(Debug)]
pub(crate) struct ResourcePool<V> {
    kind: &'static str,
    entries: Mutex<AHashMap<usize, V>>,
    next_id: AtomicUsize,
}

impl<V> ResourcePool<V> {
    pub(crate) fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(AHashMap::new()),
            next_id: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, AHashMap<usize, V>>, ResourceError> {
        self.entries.lock().map_err(|e| {
            ResourceError::BackendError(format!("Failed to lock {} pool: {e}", self.kind))
        })
    }

    /// Stores `entry` under a fresh id.
    pub(crate) fn insert(&self, entry: V) -> Result<usize, ResourceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()?.insert(id, entry);
        Ok(id)
    }

    /// Removes and returns the entry. Unknown ids yield `None`.
    pub(crate) fn remove(&self, id: usize) -> Option<V> {
        match self.lock() {
            Ok(mut entries) => entries.remove(&id),
            Err(e) => {
                log::error!("HeadlessDevice: {e}");
                None
            }
        }
    }

    /// Runs `f` on the entry, or fails with `NotFound`.
    pub(crate) fn with<R>(&self, id: usize, f: impl FnOnce(&V) -> R) -> Result<R, ResourceError> {
        let entries = self.lock()?;
        entries.get(&id).map(f).ok_or(ResourceError::NotFound)
    }

    /// Runs `f` on the mutable entry, or fails with `NotFound`.
    pub(crate) fn with_mut<R>(
        &self,
        id: usize,
        f: impl FnOnce(&mut V) -> R,
    ) -> Result<R, ResourceError> {
        let mut entries = self.lock()?;
        entries.get_mut(&id).map(f).ok_or(ResourceError::NotFound)
    }

    pub(crate) fn contains(&self, id: usize) -> bool {
        self.lock().is_ok_and(|entries| entries.contains_key(&id))
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().map_or(0, |entries| entries.len())
    }

    /// Sums `f` over every entry.
    pub(crate) fn sum(&self, f: impl Fn(&V) -> usize) -> usize {
        self.lock().map_or(0, |entries| entries.values().map(f).sum())
    }
}

impl<V: Clone> ResourcePool<V> {
    /// Returns a copy of the entry.
    pub(crate) fn get_cloned(&self, id: usize) -> Result<V, ResourceError> {
        self.with(id, V::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_never_reused() {
        let pool = ResourcePool::new("test");
        let a = pool.insert(1u32).unwrap();
        assert_eq!(pool.remove(a), Some(1));
        let b = pool.insert(2u32).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let pool: ResourcePool<u32> = ResourcePool::new("test");
        assert!(matches!(pool.with(7, |v| *v), Err(ResourceError::NotFound)));
        assert_eq!(pool.remove(7), None);
        assert!(!pool.contains(7));
    }
}
