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

//! Types used while recording commands: pass descriptors, bindings, queries and
//! submission handles.

use super::{BufferId, TextureId};
use std::borrow::Cow;

/// An opaque handle to a finished, not yet submitted, command buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBufferId(pub u64);

/// A monotonically increasing value signalled by the device when a submission
/// completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FenceValue(pub u64);

/// An opaque handle to a GPU query object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryId(pub usize);

/// The kind of query to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Counts the samples that passed the depth test between begin and end.
    Occlusion,
}

/// What happens to an attachment's contents at the start of a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<V> {
    /// Clear to the given value.
    Clear(V),
    /// Keep the existing contents.
    Load,
}

/// A color attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    /// The target texture.
    pub texture: TextureId,
    /// Array layer to render into.
    pub layer: u32,
    /// Load operation.
    pub load: LoadOp<[f32; 4]>,
}

impl ColorAttachment {
    /// An attachment that keeps its contents.
    pub fn load(texture: TextureId) -> Self {
        Self {
            texture,
            layer: 0,
            load: LoadOp::Load,
        }
    }

    /// An attachment cleared to `color`.
    pub fn clear(texture: TextureId, color: [f32; 4]) -> Self {
        Self {
            texture,
            layer: 0,
            load: LoadOp::Clear(color),
        }
    }
}

/// The depth attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    /// The depth texture.
    pub texture: TextureId,
    /// Array layer to render into.
    pub layer: u32,
    /// Load operation for depth.
    pub load: LoadOp<f32>,
    /// When `true` the attachment is bound read-only (depth test without writes).
    pub read_only: bool,
}

/// Describes a render pass.
#[derive(Debug, Clone)]
pub struct RenderPassDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
    /// Color attachments in slot order.
    pub color_attachments: &'a [ColorAttachment],
    /// Optional depth attachment.
    pub depth_attachment: Option<DepthAttachment>,
}

/// Describes a compute pass.
#[derive(Debug, Clone, Default)]
pub struct ComputePassDescriptor<'a> {
    /// Debug label.
    pub label: Option<Cow<'a, str>>,
}

/// A resource bound to a shader slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceBinding {
    /// A constant buffer.
    ConstantBuffer(BufferId),
    /// A read-only structured buffer.
    Buffer(BufferId),
    /// A writable buffer.
    StorageBuffer(BufferId),
    /// A read-only texture view.
    Texture(TextureId),
    /// A writable texture view.
    StorageTexture(TextureId),
}

/// Coarse pixel shading rates for variable-rate shading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadingRate {
    /// Full rate.
    #[default]
    Rate1x1,
    /// One shade per 1x2 pixels.
    Rate1x2,
    /// One shade per 2x1 pixels.
    Rate2x1,
    /// One shade per 2x2 pixels.
    Rate2x2,
    /// One shade per 4x4 pixels.
    Rate4x4,
}

/// Optional device capabilities the renderer adapts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceFeature {
    /// Image-based (tier 2) variable-rate shading.
    VariableRateShadingImage,
    /// Occlusion queries.
    OcclusionQueries,
}
