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

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use prism_core::renderer::{CommandBuffer, CommandBufferId, CommandBufferInfo, CommandBufferLevel};
use prism_data::scene::{ModelHandle, RenderObject};
use prism_lanes::{QueueEntry, RenderQueue, RenderQueueDesc};

fn entries(count: u32, transparent: bool) -> Vec<QueueEntry> {
    let info = CommandBufferInfo {
        label: None,
        level: CommandBufferLevel::Secondary,
    };
    let package = CommandBuffer::new(CommandBufferId(0), &info).package();
    (0..count)
        .map(|i| QueueEntry {
            object: RenderObject {
                model: ModelHandle::default(),
                // deterministic scatter
                depth: ((i.wrapping_mul(2_654_435_761)) % 1000) as f32 * 0.1,
            },
            sub_model: 0,
            pass: 0,
            phase: 1,
            transparent,
            priority: i % 4,
            hash: i.wrapping_mul(40_503) % 64,
            package: package.clone(),
        })
        .collect()
}

fn bench_queue_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("Render Queue");

    let opaque = entries(10_000, false);
    let mut queue = RenderQueue::new(RenderQueueDesc::opaque(1));
    group.bench_function("Opaque insert + sort (10k)", |b| {
        b.iter(|| {
            queue.clear();
            for entry in &opaque {
                queue.insert(entry.clone());
            }
            queue.sort();
            black_box(queue.len());
        });
    });

    let transparent = entries(10_000, true);
    let mut queue = RenderQueue::new(RenderQueueDesc::transparent(1));
    group.bench_function("Transparent insert + sort (10k)", |b| {
        b.iter(|| {
            queue.clear();
            for entry in &transparent {
                queue.insert(entry.clone());
            }
            queue.sort();
            black_box(queue.len());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_queue_sort);
criterion_main!(benches);
