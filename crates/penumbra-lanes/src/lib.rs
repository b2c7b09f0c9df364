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

//! # Penumbra Lanes
//!
//! The hot paths of a frame, grouped by concern:
//!
//! - [`visibility_lane`]: frustum culling against the camera and every light view,
//!   material batching, and occlusion-query bookkeeping.
//! - [`light_lane`]: GPU light records, growable light buffers and cascade math.
//! - [`render_lane`]: the frame passes, the resources they share, and the schedule
//!   that keeps resource access states consistent between them.

#![warn(missing_docs)]

pub mod light_lane;
pub mod render_lane;
pub mod visibility_lane;

#[cfg(test)]
mod test_support;
