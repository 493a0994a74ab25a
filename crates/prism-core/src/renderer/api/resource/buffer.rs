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

use crate::renderer::api::util::BufferUsage;

/// An opaque handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

/// Where the memory of a buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryUsage {
    /// Device-local memory, updated through the queue.
    #[default]
    Device,
    /// Host-visible memory, mapped by the CPU.
    Host,
}

/// Describes a buffer to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferInfo {
    /// A debug label.
    pub label: Option<String>,
    /// Allowed usages.
    pub usage: BufferUsage,
    /// Memory placement.
    pub memory: MemoryUsage,
    /// Size in bytes. Must be non-zero.
    pub size: u64,
    /// Element stride in bytes (vertex size for vertex buffers).
    pub stride: u32,
}

impl BufferInfo {
    /// A uniform buffer of `size` bytes that can be updated every frame.
    pub fn uniform(label: &str, size: u64) -> Self {
        Self {
            label: Some(label.to_string()),
            usage: BufferUsage::UNIFORM | BufferUsage::TRANSFER_DST,
            memory: MemoryUsage::Device,
            size,
            stride: size as u32,
        }
    }

    /// A vertex buffer of `size` bytes with elements of `stride` bytes.
    pub fn vertex(label: &str, size: u64, stride: u32) -> Self {
        Self {
            label: Some(label.to_string()),
            usage: BufferUsage::VERTEX | BufferUsage::TRANSFER_DST,
            memory: MemoryUsage::Device,
            size,
            stride,
        }
    }

    /// An index buffer of `size` bytes with indices of `stride` bytes.
    pub fn index(label: &str, size: u64, stride: u32) -> Self {
        Self {
            label: Some(label.to_string()),
            usage: BufferUsage::INDEX | BufferUsage::TRANSFER_DST,
            memory: MemoryUsage::Device,
            size,
            stride,
        }
    }
}
