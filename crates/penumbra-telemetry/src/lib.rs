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

//! # Penumbra Telemetry
//!
//! Logger initialisation and the per-frame statistics the render agent collects.

#![warn(missing_docs)]

pub mod frame_stats;
pub mod logging;
pub mod timer;

pub use frame_stats::{FrameStats, FrameStatsAverage, FrameStatsHistory, DEFAULT_STATS_WINDOW};
pub use logging::{init_logging, init_logging_with_filter};
pub use timer::Stopwatch;
