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

//! Acts as the **[A]gent** for the rendering subsystem.
//!
//! The agent owns the frame resources, the pass sequence and the light buffers. Each
//! call to [`RenderAgent::render_frame`] runs the visibility lane, the light lane and
//! the render lane in order, submits one command buffer and records the frame's
//! statistics.

mod agent;
mod resize;

pub use agent::*;
pub use resize::*;
