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

//! Provides types for creating and describing GPU buffers.

use std::borrow::Cow;

/// An opaque handle to a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

bitflags::bitflags! {
    /// Describes how a buffer will be bound. Combine flags for buffers used in several
    /// ways (e.g. `STRUCTURED | COPY_DST`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Bound as a vertex stream.
        const VERTEX = 1 << 0;
        /// Bound as an index buffer.
        const INDEX = 1 << 1;
        /// Bound as a constant (uniform) buffer.
        const CONSTANT = 1 << 2;
        /// Bound as a read-only structured buffer.
        const STRUCTURED = 1 << 3;
        /// Writable from compute shaders.
        const UNORDERED_ACCESS = 1 << 4;
        /// Destination of `update_buffer` and copies.
        const COPY_DST = 1 << 5;
        /// Source of copies.
        const COPY_SRC = 1 << 6;
    }
}

/// The width of the indices in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit unsigned indices.
    Uint16,
    /// 32-bit unsigned indices.
    #[default]
    Uint32,
}

/// A descriptor used to create a buffer.
#[derive(Debug, Clone)]
pub struct BufferDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// The size of the buffer in bytes.
    pub size: u64,
    /// Element stride for structured buffers, `0` otherwise.
    pub stride: u32,
    /// How the buffer will be bound.
    pub usage: BufferUsage,
    /// The access state the buffer is created in.
    pub initial_state: super::ResourceState,
}
