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

//! The headless queue and the per-frame command allocator.

use prism_core::renderer::{CommandPackage, CommandStats, FrameStats, GfxCommand};

/// Keeps the secondary packages referenced by submitted buffers alive until the frame is
/// presented.
#[derive(Debug, Default)]
pub(crate) struct CommandAllocator {
    packages: Vec<CommandPackage>,
}

impl CommandAllocator {
    pub(crate) fn retain(&mut self, package: &CommandPackage) {
        self.packages.push(package.clone());
    }

    pub(crate) fn reset(&mut self) {
        self.packages.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.packages.len()
    }
}

/// Accumulates the statistics and the flattened command stream of the current frame.
#[derive(Debug, Default)]
pub(crate) struct HeadlessQueue {
    pending: CommandStats,
    pending_buffers: u32,
    frame_log: Vec<GfxCommand>,
    last_frame_log: Vec<GfxCommand>,
    stats: FrameStats,
}

impl HeadlessQueue {
    pub(crate) fn record(&mut self, stats: CommandStats, commands: Vec<GfxCommand>) {
        self.pending.accumulate(&stats);
        self.pending_buffers += 1;
        self.frame_log.extend(commands);
    }

    /// Publishes the pending statistics and starts a new frame.
    pub(crate) fn flush(&mut self) -> FrameStats {
        self.stats = FrameStats {
            frame_number: self.stats.frame_number + 1,
            draw_calls: self.pending.draw_calls,
            instances: self.pending.instances,
            triangles: self.pending.triangles,
            command_buffers: self.pending_buffers,
        };
        self.pending = CommandStats::default();
        self.pending_buffers = 0;
        self.last_frame_log = std::mem::take(&mut self.frame_log);
        self.stats
    }

    pub(crate) fn stats(&self) -> FrameStats {
        self.stats
    }

    pub(crate) fn last_frame_log(&self) -> &[GfxCommand] {
        &self.last_frame_log
    }
}

/// Flattens nested packages into `out`, handing every package to `on_package`.
pub(crate) fn flatten_commands(
    commands: &[GfxCommand],
    out: &mut Vec<GfxCommand>,
    on_package: &mut dyn FnMut(&CommandPackage),
) {
    for command in commands {
        match command {
            GfxCommand::Execute(package) => {
                on_package(package);
                flatten_commands(package.commands(), out, on_package);
            }
            other => out.push(other.clone()),
        }
    }
}
