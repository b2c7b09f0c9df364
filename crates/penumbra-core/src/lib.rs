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

//! # Penumbra Core
//!
//! Foundational crate containing the math primitives, GPU-facing types and the
//! device/command interface contracts that every other Penumbra crate builds on.
//!
//! Nothing in this crate talks to a real graphics API. Backends implement the
//! [`renderer::GraphicsDevice`] and [`renderer::CommandEncoder`] traits and the rest of
//! the renderer only ever sees opaque ids.

#![warn(missing_docs)]

pub mod math;
pub mod renderer;
