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

//! Per-frame counters and their rolling average.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Frames kept by [`FrameStatsHistory::default`].
pub const DEFAULT_STATS_WINDOW: usize = 120;

/// What one frame did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameStats {
    /// Frame counter.
    pub frame_index: u64,
    /// Camera-visible drawables shaded in the deferred path.
    pub visible_deferred: u32,
    /// Camera-visible drawables shaded in the forward pass.
    pub visible_forward: u32,
    /// Drawables currently considered occluded.
    pub occluded: u32,
    /// Deferred and forward camera batches.
    pub camera_batches: u32,
    /// Batches of every shadow view: cascades and point-light sub-views.
    pub shadow_batches: u32,
    /// Point lights shaded without shadows.
    pub point_lights: u32,
    /// Point lights with a shadow map this frame.
    pub shadow_point_lights: u32,
    /// Draw calls recorded.
    pub draw_calls: u32,
    /// Compute dispatches recorded.
    pub dispatches: u32,
    /// Occlusion queries issued.
    pub queries: u32,
    /// Resource state transitions recorded.
    pub barriers: u64,
    /// CPU time spent culling and batching, in milliseconds.
    pub cpu_culling_ms: f64,
    /// CPU time spent preparing and recording the passes, in milliseconds.
    pub cpu_recording_ms: f64,
}

/// Mean of every [`FrameStats`] counter over a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameStatsAverage {
    /// Frames averaged.
    pub frames: usize,
    /// See [`FrameStats::visible_deferred`].
    pub visible_deferred: f64,
    /// See [`FrameStats::visible_forward`].
    pub visible_forward: f64,
    /// See [`FrameStats::occluded`].
    pub occluded: f64,
    /// See [`FrameStats::camera_batches`].
    pub camera_batches: f64,
    /// See [`FrameStats::shadow_batches`].
    pub shadow_batches: f64,
    /// See [`FrameStats::draw_calls`].
    pub draw_calls: f64,
    /// See [`FrameStats::dispatches`].
    pub dispatches: f64,
    /// See [`FrameStats::barriers`].
    pub barriers: f64,
    /// See [`FrameStats::cpu_culling_ms`].
    pub cpu_culling_ms: f64,
    /// See [`FrameStats::cpu_recording_ms`].
    pub cpu_recording_ms: f64,
}

impl fmt::Display for FrameStatsAverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames: visible {:.1}+{:.1} (occluded {:.1}), batches {:.1}/{:.1} shadow, \
             draws {:.1}, dispatches {:.1}, barriers {:.1}, cull {:.3}ms, record {:.3}ms",
            self.frames,
            self.visible_deferred,
            self.visible_forward,
            self.occluded,
            self.camera_batches,
            self.shadow_batches,
            self.draw_calls,
            self.dispatches,
            self.barriers,
            self.cpu_culling_ms,
            self.cpu_recording_ms
        )
    }
}

/// The stats of the most recent frames.
#[derive(Debug, Clone)]
pub struct FrameStatsHistory {
    frames: VecDeque<FrameStats>,
    window: usize,
}

impl Default for FrameStatsHistory {
    fn default() -> Self {
        Self::new(DEFAULT_STATS_WINDOW)
    }
}

impl FrameStatsHistory {
    /// Keeps the last `window` frames. A zero window keeps one.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            frames: VecDeque::with_capacity(window),
            window,
        }
    }

    /// Appends a frame, dropping the oldest when the window is full.
    pub fn push(&mut self, stats: FrameStats) {
        if self.frames.len() == self.window {
            self.frames.pop_front();
        }
        self.frames.push_back(stats);
    }

    /// The most recent frame.
    pub fn latest(&self) -> Option<&FrameStats> {
        self.frames.back()
    }

    /// Frames currently held.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` before the first frame.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames held, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &FrameStats> + '_ {
        self.frames.iter()
    }

    /// The mean over the held frames. All zero when empty.
    pub fn average(&self) -> FrameStatsAverage {
        let n = self.frames.len();
        if n == 0 {
            return FrameStatsAverage::default();
        }
        let mut sum = FrameStatsAverage {
            frames: n,
            ..Default::default()
        };
        for s in &self.frames {
            sum.visible_deferred += s.visible_deferred as f64;
            sum.visible_forward += s.visible_forward as f64;
            sum.occluded += s.occluded as f64;
            sum.camera_batches += s.camera_batches as f64;
            sum.shadow_batches += s.shadow_batches as f64;
            sum.draw_calls += s.draw_calls as f64;
            sum.dispatches += s.dispatches as f64;
            sum.barriers += s.barriers as f64;
            sum.cpu_culling_ms += s.cpu_culling_ms;
            sum.cpu_recording_ms += s.cpu_recording_ms;
        }
        let n = n as f64;
        FrameStatsAverage {
            frames: sum.frames,
            visible_deferred: sum.visible_deferred / n,
            visible_forward: sum.visible_forward / n,
            occluded: sum.occluded / n,
            camera_batches: sum.camera_batches / n,
            shadow_batches: sum.shadow_batches / n,
            draw_calls: sum.draw_calls / n,
            dispatches: sum.dispatches / n,
            barriers: sum.barriers / n,
            cpu_culling_ms: sum.cpu_culling_ms / n,
            cpu_recording_ms: sum.cpu_recording_ms / n,
        }
    }

    /// The average as a JSON object.
    pub fn average_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.average())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame(index: u64, draws: u32) -> FrameStats {
        FrameStats {
            frame_index: index,
            draw_calls: draws,
            cpu_culling_ms: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_window_rolls() {
        let mut history = FrameStatsHistory::new(3);
        for i in 0..5 {
            history.push(frame(i, i as u32 * 10));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.latest().map(|s| s.frame_index), Some(4));
        let first: Vec<_> = history.iter().map(|s| s.frame_index).collect();
        assert_eq!(first, vec![2, 3, 4]);

        let average = history.average();
        assert_eq!(average.frames, 3);
        assert_relative_eq!(average.draw_calls, 30.0);
        assert_relative_eq!(average.cpu_culling_ms, 1.0);
    }

    #[test]
    fn test_empty_average() {
        let history = FrameStatsHistory::default();
        assert!(history.is_empty());
        assert_eq!(history.average(), FrameStatsAverage::default());
    }

    #[test]
    fn test_default_window() {
        let mut history = FrameStatsHistory::default();
        for i in 0..(DEFAULT_STATS_WINDOW as u64 + 30) {
            history.push(frame(i, 1));
        }
        assert_eq!(history.len(), DEFAULT_STATS_WINDOW);
    }

    #[test]
    fn test_average_serializes() {
        let mut history = FrameStatsHistory::new(4);
        history.push(frame(0, 8));
        let json = history.average_json().expect("json");
        assert!(json.contains("\"draw_calls\": 8.0"));
    }
}
