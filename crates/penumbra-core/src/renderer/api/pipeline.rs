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

//! Declarative descriptions of graphics and compute pipelines.
//!
//! Pipelines name their shader programs symbolically; compiling them is the backend's
//! business.

use super::TextureFormat;

/// An opaque handle to a graphics (rasterization) pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphicsPipelineId(pub usize);

/// An opaque handle to a compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputePipelineId(pub usize);

/// A reference to a shader program plus the preprocessor defines of the variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderProgram {
    /// Symbolic program name, e.g. `"BasePass.ps"`.
    pub name: String,
    /// Variant defines, e.g. `"ALPHA_MASKED"`.
    pub defines: Vec<String>,
}

impl ShaderProgram {
    /// Creates a program reference without defines.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defines: Vec::new(),
        }
    }

    /// Adds a define, builder-style.
    pub fn with_define(mut self, define: impl Into<String>) -> Self {
        self.defines.push(define.into());
        self
    }
}

bitflags::bitflags! {
    /// The vertex streams a pipeline consumes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VertexStreams: u32 {
        /// Object-space positions.
        const POSITIONS = 1 << 0;
        /// Vertex normals.
        const NORMALS = 1 << 1;
        /// Texture coordinates.
        const TEXCOORDS = 1 << 2;
        /// Tangents.
        const TANGENTS = 1 << 3;
    }
}

/// Triangle face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Draw both faces.
    None,
    /// Cull back faces.
    #[default]
    Back,
}

/// The comparison used by the depth test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompareFunction {
    /// Passes when the incoming depth is less than the stored one.
    Less,
    /// Passes when the incoming depth is less than or equal to the stored one.
    #[default]
    LessEqual,
    /// Passes when the depths are equal. Used after a depth pre-pass.
    Equal,
    /// Always passes.
    Always,
}

/// Depth test and write configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    /// The depth target format.
    pub format: TextureFormat,
    /// Whether depth is written.
    pub write_enabled: bool,
    /// The comparison function.
    pub compare: CompareFunction,
}

/// A descriptor used to create a graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDescriptor {
    /// Debug label.
    pub label: String,
    /// Vertex stage program.
    pub vertex: ShaderProgram,
    /// Pixel stage program. `None` for depth-only pipelines.
    pub pixel: Option<ShaderProgram>,
    /// Vertex streams consumed by the vertex stage.
    pub vertex_streams: VertexStreams,
    /// Formats of the color targets, in slot order.
    pub color_formats: Vec<TextureFormat>,
    /// Depth configuration, if a depth target is bound.
    pub depth: Option<DepthState>,
    /// Face culling.
    pub cull_mode: CullMode,
    /// When `false` the pipeline writes no color even if targets are bound.
    pub color_writes: bool,
}

/// A descriptor used to create a compute pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputePipelineDescriptor {
    /// Debug label.
    pub label: String,
    /// Compute program.
    pub program: ShaderProgram,
}
