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

//! Provides types for creating and describing GPU textures.

use super::ResourceState;
use std::borrow::Cow;

/// An opaque handle to a GPU texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// The texel formats used by the renderer's targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA, normalized.
    Rgba8Unorm,
    /// 8-bit BGRA, normalized. Typical swapchain format.
    Bgra8Unorm,
    /// 10/10/10/2 packed normals.
    Rgb10A2Unorm,
    /// 16-bit float RGBA, used for HDR scene color.
    Rgba16Float,
    /// 16-bit float RG, used for velocity.
    Rg16Float,
    /// 32-bit float RG, used for min/max depth reduction.
    Rg32Float,
    /// 32-bit float R.
    R32Float,
    /// 8-bit normalized R.
    R8Unorm,
    /// 8-bit unsigned integer R, used for shading-rate images and cascade indices.
    R8Uint,
    /// 32-bit float depth.
    Depth32Float,
}

impl TextureFormat {
    /// Returns the size of one texel in bytes.
    pub const fn bytes_per_texel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm | TextureFormat::R8Uint => 1,
            TextureFormat::Rgba8Unorm
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Rgb10A2Unorm
            | TextureFormat::Rg16Float
            | TextureFormat::R32Float
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float | TextureFormat::Rg32Float => 8,
        }
    }

    /// Returns `true` for depth formats.
    pub const fn is_depth(&self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }
}

bitflags::bitflags! {
    /// Describes how a texture will be bound.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Sampled or loaded in shaders.
        const SHADER_RESOURCE = 1 << 0;
        /// Bound as a color render target.
        const RENDER_TARGET = 1 << 1;
        /// Bound as a depth-stencil target.
        const DEPTH_STENCIL = 1 << 2;
        /// Writable from compute shaders.
        const UNORDERED_ACCESS = 1 << 3;
        /// Read by the rasterizer as a variable-rate-shading image.
        const SHADING_RATE = 1 << 4;
        /// Source or destination of texture copies.
        const COPY = 1 << 5;
    }
}

/// The shape of a texture resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureDimension {
    /// A single 2D image (or a 2D array when `array_layers > 1`).
    #[default]
    D2,
    /// An array of cube maps; `array_layers` must be a multiple of six.
    CubeArray,
}

/// A descriptor used to create a texture.
#[derive(Debug, Clone)]
pub struct TextureDescriptor<'a> {
    /// An optional debug label.
    pub label: Option<Cow<'a, str>>,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Number of array layers (faces for cube arrays).
    pub array_layers: u32,
    /// Number of mip levels.
    pub mip_levels: u32,
    /// Texel format.
    pub format: TextureFormat,
    /// Shape of the resource.
    pub dimension: TextureDimension,
    /// How the texture will be bound.
    pub usage: TextureUsage,
    /// The access state the texture is created in.
    pub initial_state: ResourceState,
}

impl TextureDescriptor<'_> {
    /// Approximate memory footprint of the top mip level across all layers.
    pub fn size_in_bytes(&self) -> u64 {
        self.width as u64
            * self.height as u64
            * self.array_layers.max(1) as u64
            * self.format.bytes_per_texel() as u64
    }
}
