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

/// Draw statistics of the last presented frame.
///
/// Accumulated by `submit` and published by `present`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Number of frames presented so far.
    pub frame_number: u64,
    /// Draw calls issued during the frame.
    pub draw_calls: u32,
    /// Instances drawn during the frame.
    pub instances: u32,
    /// Triangles drawn during the frame.
    pub triangles: u64,
    /// Primary command buffers submitted during the frame.
    pub command_buffers: u32,
}
