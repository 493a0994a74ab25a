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

//! Per-phase render queues.
//!
//! A queue collects one entry per (render object, sub-model, pass) whose pass matches
//! its phase mask and transparency class, sorts them, and splices their pre-recorded
//! draws into a primary command buffer.

use std::cmp::Ordering;

use prism_core::renderer::{CommandBuffer, CommandPackage, RenderPassId};
use prism_data::scene::{PassSnapshot, RenderObject, RenderScene};

/// Depth ordering inside one priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Nearest first, to maximize early depth rejection.
    #[default]
    FrontToBack,
    /// Farthest first, for correct blending.
    BackToFront,
}

/// What a queue accepts and how it sorts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderQueueDesc {
    /// Accept blended passes instead of opaque ones.
    pub is_transparent: bool,
    /// Phase bits accepted.
    pub phases: u32,
    /// Depth ordering.
    pub sort_mode: SortMode,
}

impl RenderQueueDesc {
    /// Opaque passes of `phases`, front to back.
    pub fn opaque(phases: u32) -> Self {
        Self {
            is_transparent: false,
            phases,
            sort_mode: SortMode::FrontToBack,
        }
    }

    /// Transparent passes of `phases`, back to front.
    pub fn transparent(phases: u32) -> Self {
        Self {
            is_transparent: true,
            phases,
            sort_mode: SortMode::BackToFront,
        }
    }
}

/// One queued draw.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// The object the draw belongs to.
    pub object: RenderObject,
    /// Sub-model index in the model.
    pub sub_model: usize,
    /// Pass index in the material.
    pub pass: usize,
    /// Phase bit of the pass.
    pub phase: u32,
    /// Whether the pass blends.
    pub transparent: bool,
    /// Pass priority.
    pub priority: u32,
    /// Pass hash.
    pub hash: u32,
    /// The pre-recorded draw.
    pub package: CommandPackage,
}

impl QueueEntry {
    /// An entry for `snapshot`, a pass of sub-model `sub_model` of `object`.
    pub fn from_snapshot(object: RenderObject, sub_model: usize, snapshot: &PassSnapshot) -> Self {
        Self {
            object,
            sub_model,
            pass: snapshot.pass_index,
            phase: snapshot.phase,
            transparent: snapshot.transparent,
            priority: snapshot.priority,
            hash: snapshot.hash,
            package: snapshot.package.clone(),
        }
    }
}

/// A sorted list of draws for one phase and transparency class.
#[derive(Debug)]
pub struct RenderQueue {
    desc: RenderQueueDesc,
    entries: Vec<QueueEntry>,
}

impl RenderQueue {
    /// An empty queue.
    pub fn new(desc: RenderQueueDesc) -> Self {
        Self {
            desc,
            entries: Vec::new(),
        }
    }

    /// The queue configuration.
    pub fn desc(&self) -> &RenderQueueDesc {
        &self.desc
    }

    /// Returns `true` if a pass of `phase` and transparency `transparent` belongs here.
    pub fn accepts(&self, phase: u32, transparent: bool) -> bool {
        self.desc.phases & phase != 0 && self.desc.is_transparent == transparent
    }

    /// Appends `entry` if it matches the queue. Returns whether it was kept.
    pub fn insert(&mut self, entry: QueueEntry) -> bool {
        if !self.accepts(entry.phase, entry.transparent) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Queues pass `pass` of sub-model `sub_model` of `object`, as prepared for
    /// `render_pass`. Unprepared or mismatching passes are skipped.
    pub fn insert_render_pass(
        &mut self,
        scene: &RenderScene,
        render_pass: RenderPassId,
        object: &RenderObject,
        sub_model: usize,
        pass: usize,
    ) -> bool {
        let snapshot = scene
            .get(object.model)
            .and_then(|model| model.sub_model(sub_model))
            .and_then(|sm| {
                sm.passes_for(render_pass)
                    .iter()
                    .find(|s| s.pass_index == pass)
            });
        match snapshot {
            Some(snapshot) => self.insert(QueueEntry::from_snapshot(*object, sub_model, snapshot)),
            None => {
                log::trace!(
                    "RenderQueue: no prepared pass {pass} on sub-model {sub_model} of {:?}",
                    object.model
                );
                false
            }
        }
    }

    fn compare_depth(&self, a: f32, b: f32) -> Ordering {
        match self.desc.sort_mode {
            SortMode::FrontToBack => a.total_cmp(&b),
            SortMode::BackToFront => b.total_cmp(&a),
        }
    }

    /// Orders the entries. Opaque: priority, pass hash, then depth. Transparent:
    /// priority, then depth. Equal keys keep insertion order.
    pub fn sort(&mut self) {
        let mut entries = std::mem::take(&mut self.entries);
        if self.desc.is_transparent {
            entries.sort_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| self.compare_depth(a.object.depth, b.object.depth))
            });
        } else {
            entries.sort_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(a.hash.cmp(&b.hash))
                    .then_with(|| self.compare_depth(a.object.depth, b.object.depth))
            });
        }
        self.entries = entries;
    }

    /// Drops every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The entries in their current order.
    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    /// The pre-recorded draws in their current order.
    pub fn fragments(&self) -> impl Iterator<Item = &CommandPackage> {
        self.entries.iter().map(|e| &e.package)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Splices the draws into `cmd`, which must be inside a render pass.
    pub fn record(&self, cmd: &mut CommandBuffer) {
        if self.entries.is_empty() {
            return;
        }
        let packages: Vec<CommandPackage> = self.fragments().cloned().collect();
        cmd.execute(&packages);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::renderer::{CommandBufferId, CommandBufferInfo, CommandBufferLevel};
    use prism_data::scene::ModelHandle;

    fn empty_package() -> CommandPackage {
        CommandBuffer::new(
            CommandBufferId(0),
            &CommandBufferInfo {
                label: None,
                level: CommandBufferLevel::Secondary,
            },
        )
        .package()
    }

    fn object(depth: f32) -> RenderObject {
        RenderObject {
            model: ModelHandle::default(),
            depth,
        }
    }

    fn entry(priority: u32, hash: u32, depth: f32, transparent: bool) -> QueueEntry {
        QueueEntry {
            object: object(depth),
            sub_model: 0,
            pass: 0,
            phase: 1,
            transparent,
            priority,
            hash,
            package: empty_package(),
        }
    }

    #[test]
    fn opaque_sorts_by_priority_first() {
        let mut queue = RenderQueue::new(RenderQueueDesc::opaque(1));
        for p in [3, 1, 2] {
            assert!(queue.insert(entry(p, 0, 0.0, false)));
        }
        queue.sort();
        let order: Vec<u32> = queue.entries().iter().map(|e| e.priority).collect();
        assert_eq!(order, [1, 2, 3]);
    }

    #[test]
    fn opaque_ties_break_on_hash_then_depth() {
        let mut queue = RenderQueue::new(RenderQueueDesc::opaque(1));
        queue.insert(entry(0, 9, 1.0, false));
        queue.insert(entry(0, 4, 8.0, false));
        queue.insert(entry(0, 4, 2.0, false));
        queue.sort();
        let order: Vec<(u32, f32)> = queue
            .entries()
            .iter()
            .map(|e| (e.hash, e.object.depth))
            .collect();
        assert_eq!(order, [(4, 2.0), (4, 8.0), (9, 1.0)]);
    }

    #[test]
    fn transparent_sorts_back_to_front() {
        let mut queue = RenderQueue::new(RenderQueueDesc::transparent(1));
        for d in [5.0, 1.0, 3.0] {
            assert!(queue.insert(entry(0, 0, d, true)));
        }
        queue.sort();
        let order: Vec<f32> = queue.entries().iter().map(|e| e.object.depth).collect();
        assert_eq!(order, [5.0, 3.0, 1.0]);
    }

    #[test]
    fn mismatching_entries_are_ignored() {
        let mut opaque = RenderQueue::new(RenderQueueDesc::opaque(0b01));
        assert!(!opaque.insert(entry(0, 0, 0.0, true)));
        let mut other_phase = entry(0, 0, 0.0, false);
        other_phase.phase = 0b10;
        assert!(!opaque.insert(other_phase));
        assert!(opaque.is_empty());
    }

    #[test]
    fn clear_keeps_capacity() {
        let mut queue = RenderQueue::new(RenderQueueDesc::opaque(1));
        for _ in 0..16 {
            queue.insert(entry(0, 0, 0.0, false));
        }
        let capacity = queue.entries.capacity();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.entries.capacity(), capacity);
    }
}
