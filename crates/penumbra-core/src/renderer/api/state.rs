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

//! GPU resource access states.

use std::fmt;

/// The pipeline-visible usage mode a resource is currently valid for.
///
/// Exactly one state is current per resource at any point of the recorded command
/// stream. Changing it requires an explicit transition whose before-state matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceState {
    /// Common / undefined usage.
    Common,
    /// Bound as a constant buffer.
    ConstantBuffer,
    /// Source of a copy.
    CopySource,
    /// Destination of a copy or buffer update.
    CopyDest,
    /// Color render target.
    RenderTarget,
    /// Depth target with writes enabled.
    DepthWrite,
    /// Depth target, read-only.
    DepthRead,
    /// Read-write access from shaders.
    UnorderedAccess,
    /// Read from pixel shaders.
    PixelShaderResource,
    /// Read from non-pixel stages (compute, vertex).
    NonPixelShaderResource,
    /// Read by the rasterizer as a shading-rate image.
    ShadingRateSource,
    /// Ready for presentation.
    Present,
}

impl ResourceState {
    /// Returns `true` when shaders may write the resource in this state.
    pub const fn is_write(&self) -> bool {
        matches!(
            self,
            ResourceState::CopyDest
                | ResourceState::RenderTarget
                | ResourceState::DepthWrite
                | ResourceState::UnorderedAccess
        )
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
