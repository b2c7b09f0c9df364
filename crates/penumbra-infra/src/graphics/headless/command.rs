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

use penumbra_core::renderer::{
    BufferId, CommandBufferId, CommandEncoder, ComputePass, ComputePassDescriptor,
    ComputePipelineId, GraphicsPipelineId, IndexFormat, LoadOp, QueryId, RenderPass,
    RenderPassDescriptor, ResourceBinding, ResourceState, ShadingRate, TextureId,
};
use std::ops::Range;
use std::sync::Arc;

use super::device::DeviceShared;

/// One command captured by the headless encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// A render pass started.
    BeginRenderPass {
        /// Debug label.
        label: Option<String>,
        /// Color attachments with the array layer written.
        color_attachments: Vec<(TextureId, u32)>,
        /// Depth attachment, its array layer, and whether it is read-only.
        depth_attachment: Option<(TextureId, u32, bool)>,
        /// Whether any attachment is cleared on load.
        clears: bool,
    },
    /// The current render pass ended.
    EndRenderPass,
    /// A compute pass started.
    BeginComputePass {
        /// Debug label.
        label: Option<String>,
    },
    /// The current compute pass ended.
    EndComputePass,
    /// A graphics pipeline was bound.
    SetGraphicsPipeline(GraphicsPipelineId),
    /// A compute pipeline was bound.
    SetComputePipeline(ComputePipelineId),
    /// A vertex stream was bound.
    SetVertexBuffer {
        /// Stream slot.
        slot: u32,
        /// Buffer.
        buffer: BufferId,
    },
    /// An index buffer was bound.
    SetIndexBuffer {
        /// Buffer.
        buffer: BufferId,
        /// Index width.
        format: IndexFormat,
    },
    /// A shader resource was bound.
    SetBinding {
        /// Shader slot.
        slot: u32,
        /// Resource and access kind.
        binding: ResourceBinding,
    },
    /// Root constants were written.
    SetConstants(Vec<u8>),
    /// Non-indexed draw.
    Draw {
        /// Vertex range.
        vertices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// Indexed draw.
    DrawIndexed {
        /// Index range.
        indices: Range<u32>,
        /// Added to every index.
        base_vertex: i32,
        /// Instance range.
        instances: Range<u32>,
    },
    /// Compute dispatch.
    Dispatch {
        /// Thread groups per axis.
        groups: [u32; 3],
    },
    /// An occlusion query started.
    BeginQuery(QueryId),
    /// An occlusion query ended.
    EndQuery(QueryId),
    /// A texture changed state.
    TransitionTexture {
        /// Texture.
        texture: TextureId,
        /// Claimed current state.
        before: ResourceState,
        /// New state.
        after: ResourceState,
    },
    /// A buffer changed state.
    TransitionBuffer {
        /// Buffer.
        buffer: BufferId,
        /// Claimed current state.
        before: ResourceState,
        /// New state.
        after: ResourceState,
    },
    /// Inline buffer write.
    UpdateBuffer {
        /// Buffer.
        buffer: BufferId,
        /// Byte offset.
        offset: u64,
        /// Bytes written.
        len: usize,
    },
    /// Unordered-access clear.
    ClearUnorderedAccess {
        /// Texture.
        texture: TextureId,
        /// Clear value.
        value: [f32; 4],
    },
    /// Depth clear outside a render pass.
    ClearDepth {
        /// Texture.
        texture: TextureId,
        /// Clear value.
        depth: f32,
    },
    /// Whole-texture copy.
    CopyTexture {
        /// Source, in `CopySource`.
        source: TextureId,
        /// Destination, in `CopyDest`.
        destination: TextureId,
    },
    /// Base shading rate.
    SetShadingRate(ShadingRate),
    /// Shading-rate image binding.
    SetShadingRateImage(Option<TextureId>),
    /// Debug region opened.
    PushDebugGroup(String),
    /// Debug region closed.
    PopDebugGroup,
    /// Presentation request.
    Present {
        /// Presented image.
        back_buffer: TextureId,
        /// Whether presentation waits for vertical blank.
        vsync: bool,
    },
}

pub struct HeadlessRenderPass<'a> {
    commands: &'a mut Vec<RecordedCommand>,
}

impl<'pass> RenderPass<'pass> for HeadlessRenderPass<'pass> {
    fn set_pipeline(&mut self, pipeline: GraphicsPipelineId) {
        self.commands
            .push(RecordedCommand::SetGraphicsPipeline(pipeline));
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, _offset: u64) {
        self.commands
            .push(RecordedCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferId, _offset: u64, format: IndexFormat) {
        self.commands
            .push(RecordedCommand::SetIndexBuffer { buffer, format });
    }

    fn set_binding(&mut self, slot: u32, binding: ResourceBinding) {
        self.commands
            .push(RecordedCommand::SetBinding { slot, binding });
    }

    fn set_constants(&mut self, data: &[u8]) {
        self.commands
            .push(RecordedCommand::SetConstants(data.to_vec()));
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands
            .push(RecordedCommand::Draw { vertices, instances });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.commands.push(RecordedCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn begin_query(&mut self, query: QueryId) {
        self.commands.push(RecordedCommand::BeginQuery(query));
    }

    fn end_query(&mut self, query: QueryId) {
        self.commands.push(RecordedCommand::EndQuery(query));
    }
}

impl Drop for HeadlessRenderPass<'_> {
    fn drop(&mut self) {
        self.commands.push(RecordedCommand::EndRenderPass);
    }
}

pub struct HeadlessComputePass<'a> {
    commands: &'a mut Vec<RecordedCommand>,
}

impl<'pass> ComputePass<'pass> for HeadlessComputePass<'pass> {
    fn set_pipeline(&mut self, pipeline: ComputePipelineId) {
        self.commands
            .push(RecordedCommand::SetComputePipeline(pipeline));
    }

    fn set_binding(&mut self, slot: u32, binding: ResourceBinding) {
        self.commands
            .push(RecordedCommand::SetBinding { slot, binding });
    }

    fn set_constants(&mut self, data: &[u8]) {
        self.commands
            .push(RecordedCommand::SetConstants(data.to_vec()));
    }

    fn dispatch_workgroups(&mut self, x: u32, y: u32, z: u32) {
        self.commands
            .push(RecordedCommand::Dispatch { groups: [x, y, z] });
    }
}

impl Drop for HeadlessComputePass<'_> {
    fn drop(&mut self) {
        self.commands.push(RecordedCommand::EndComputePass);
    }
}

/// Records commands into memory. `finish` hands them to the device under a fresh
/// command-buffer id.
pub struct HeadlessCommandEncoder {
    pub(crate) label: Option<String>,
    pub(crate) commands: Vec<RecordedCommand>,
    pub(crate) device: Arc<DeviceShared>,
}

impl CommandEncoder for HeadlessCommandEncoder {
    fn begin_render_pass<'encoder>(
        &'encoder mut self,
        descriptor: &RenderPassDescriptor<'_>,
    ) -> Box<dyn RenderPass<'encoder> + 'encoder> {
        let clears = descriptor
            .color_attachments
            .iter()
            .any(|a| matches!(a.load, LoadOp::Clear(_)))
            || descriptor
                .depth_attachment
                .is_some_and(|d| matches!(d.load, LoadOp::Clear(_)));
        self.commands.push(RecordedCommand::BeginRenderPass {
            label: descriptor.label.as_ref().map(|l| l.to_string()),
            color_attachments: descriptor
                .color_attachments
                .iter()
                .map(|a| (a.texture, a.layer))
                .collect(),
            depth_attachment: descriptor
                .depth_attachment
                .map(|d| (d.texture, d.layer, d.read_only)),
            clears,
        });
        Box::new(HeadlessRenderPass {
            commands: &mut self.commands,
        })
    }

    fn begin_compute_pass<'encoder>(
        &'encoder mut self,
        descriptor: &ComputePassDescriptor<'_>,
    ) -> Box<dyn ComputePass<'encoder> + 'encoder> {
        self.commands.push(RecordedCommand::BeginComputePass {
            label: descriptor.label.as_ref().map(|l| l.to_string()),
        });
        Box::new(HeadlessComputePass {
            commands: &mut self.commands,
        })
    }

    fn transition_texture(
        &mut self,
        texture: TextureId,
        before: ResourceState,
        after: ResourceState,
    ) {
        self.commands.push(RecordedCommand::TransitionTexture {
            texture,
            before,
            after,
        });
    }

    fn transition_buffer(&mut self, buffer: BufferId, before: ResourceState, after: ResourceState) {
        self.commands.push(RecordedCommand::TransitionBuffer {
            buffer,
            before,
            after,
        });
    }

    fn update_buffer(&mut self, buffer: BufferId, offset: u64, data: &[u8]) {
        self.commands.push(RecordedCommand::UpdateBuffer {
            buffer,
            offset,
            len: data.len(),
        });
    }

    fn clear_unordered_access(&mut self, texture: TextureId, value: [f32; 4]) {
        self.commands
            .push(RecordedCommand::ClearUnorderedAccess { texture, value });
    }

    fn clear_depth(&mut self, texture: TextureId, depth: f32) {
        self.commands
            .push(RecordedCommand::ClearDepth { texture, depth });
    }

    fn copy_texture(&mut self, source: TextureId, destination: TextureId) {
        self.commands.push(RecordedCommand::CopyTexture {
            source,
            destination,
        });
    }

    fn set_shading_rate(&mut self, rate: ShadingRate) {
        self.commands.push(RecordedCommand::SetShadingRate(rate));
    }

    fn set_shading_rate_image(&mut self, image: Option<TextureId>) {
        self.commands
            .push(RecordedCommand::SetShadingRateImage(image));
    }

    fn push_debug_group(&mut self, label: &str) {
        self.commands
            .push(RecordedCommand::PushDebugGroup(label.to_string()));
    }

    fn pop_debug_group(&mut self) {
        self.commands.push(RecordedCommand::PopDebugGroup);
    }

    fn present(&mut self, back_buffer: TextureId, vsync: bool) {
        self.commands
            .push(RecordedCommand::Present { back_buffer, vsync });
    }

    fn finish(self: Box<Self>) -> CommandBufferId {
        let encoder = *self;
        encoder.device.store_command_buffer(encoder.label, encoder.commands)
    }
}
