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

//! Device-level descriptions: adapter identity, capabilities, configuration, statistics.

pub mod adapter;
pub mod caps;
pub mod settings;
pub mod stats;

pub use self::adapter::GraphicsAdapterInfo;
pub use self::caps::{DeviceCaps, DeviceFeatures, DeviceLimits};
pub use self::settings::DeviceInfo;
pub use self::stats::FrameStats;
