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

use crate::renderer::api::{
    BufferId, CommandBufferId, ComputePassDescriptor, ComputePipelineId, GraphicsPipelineId,
    IndexFormat, QueryId, RenderPassDescriptor, ResourceBinding, ResourceState, ShadingRate,
    TextureId,
};
use std::ops::Range;

/// A trait representing an active render pass, used for recording drawing commands.
///
/// A `RenderPass` object is obtained from a [`CommandEncoder`]. The pass ends when the
/// object is dropped.
///
/// The `'pass` lifetime ensures that the pass object cannot outlive the
/// [`CommandEncoder`] that created it.
pub trait RenderPass<'pass> {
    /// Sets the active graphics pipeline for subsequent draw calls.
    fn set_pipeline(&mut self, pipeline: GraphicsPipelineId);

    /// Binds a vertex buffer to a specific slot.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds an index buffer for indexed drawing.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, index_format: IndexFormat);

    /// Binds a resource to a shader slot.
    fn set_binding(&mut self, slot: u32, binding: ResourceBinding);

    /// Writes inline root constants visible to all stages.
    fn set_constants(&mut self, data: &[u8]);

    /// Records a non-indexed draw call.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Records an indexed draw call.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Starts counting samples for `query`.
    fn begin_query(&mut self, query: QueryId);

    /// Stops counting samples for `query`.
    fn end_query(&mut self, query: QueryId);
}

/// A trait representing an active compute pass, used for recording dispatch commands.
pub trait ComputePass<'pass> {
    /// Sets the active compute pipeline.
    fn set_pipeline(&mut self, pipeline: ComputePipelineId);

    /// Binds a resource to a shader slot.
    fn set_binding(&mut self, slot: u32, binding: ResourceBinding);

    /// Writes inline root constants.
    fn set_constants(&mut self, data: &[u8]);

    /// Dispatches `x * y * z` thread groups.
    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32);
}

/// A trait for an object that records a sequence of GPU commands.
///
/// A `CommandEncoder` is the main tool for building a [`CommandBufferId`]. It creates
/// render and compute passes and records the commands that live between passes:
/// state transitions, buffer updates, clears, copies and presentation.
pub trait CommandEncoder {
    /// Begins a new render pass, returning a mutable `RenderPass` object.
    ///
    /// The returned object borrows the encoder mutably, so only one pass can be active
    /// at a time. When it is dropped, the pass is ended.
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder>;

    /// Begins a new compute pass, returning a mutable `ComputePass` object.
    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass<'encoder> + 'encoder>;

    /// Records an access-state transition of a texture.
    fn transition_texture(
        &mut self,
        texture: TextureId,
        before: ResourceState,
        after: ResourceState,
    );

    /// Records an access-state transition of a buffer.
    fn transition_buffer(&mut self, buffer: BufferId, before: ResourceState, after: ResourceState);

    /// Records an inline write of `data` into `buffer` at `offset`. The buffer must be
    /// in [`ResourceState::CopyDest`].
    fn update_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]);

    /// Clears a texture in [`ResourceState::UnorderedAccess`] to `value`.
    fn clear_unordered_access(&mut self, texture: TextureId, value: [f32; 4]);

    /// Clears a depth texture in [`ResourceState::DepthWrite`] to `depth`.
    fn clear_depth(&mut self, texture: TextureId, depth: f32);

    /// Copies `source` (in `CopySource`) into `destination` (in `CopyDest`).
    fn copy_texture(&mut self, source: TextureId, destination: TextureId);

    /// Sets the base shading rate for subsequent draws.
    fn set_shading_rate(&mut self, rate: ShadingRate);

    /// Binds (or unbinds) the shading-rate image used by subsequent draws.
    fn set_shading_rate_image(&mut self, image: Option<TextureId>);

    /// Opens a named debug region.
    fn push_debug_group(&mut self, label: &str);

    /// Closes the innermost debug region.
    fn pop_debug_group(&mut self);

    /// Queues presentation of `back_buffer`, which must be in [`ResourceState::Present`].
    fn present(&mut self, back_buffer: TextureId, vsync: bool);

    /// Finalizes the command recording and returns a handle to the resulting command
    /// buffer.
    ///
    /// This method consumes the encoder. The returned [`CommandBufferId`] can then be
    /// submitted to the `GraphicsDevice`.
    fn finish(self: Box<Self>) -> CommandBufferId;
}
