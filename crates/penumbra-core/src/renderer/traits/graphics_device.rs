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
    BufferDescriptor, BufferId, CommandBufferId, ComputePipelineDescriptor, ComputePipelineId,
    DeviceFeature, FenceValue, GraphicsPipelineDescriptor, GraphicsPipelineId, QueryId,
    QueryKind, TextureDescriptor, TextureId,
};
use crate::renderer::error::{RenderError, ResourceError};
use crate::renderer::traits::CommandEncoder;

/// The resource factory and submission queue of a graphics backend.
///
/// Every returned handle is opaque. Implementations must be shareable across threads;
/// command recording itself happens through the single [`CommandEncoder`] created per
/// frame.
pub trait GraphicsDevice: Send + Sync {
    /// Creates a new GPU buffer.
    /// ## Arguments
    /// * `descriptor` - The buffer configuration, including its initial access state.
    /// ## Returns
    /// A `Result` containing the ID of the created buffer or an error if the creation fails.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Destroys a GPU buffer.
    /// ## Arguments
    /// * `id` - The ID of the buffer to be destroyed.
    /// ## Returns
    /// A `Result` indicating success or failure of the operation.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    /// Creates a new GPU texture.
    /// ## Arguments
    /// * `descriptor` - The texture configuration, including its initial access state.
    /// ## Returns
    /// A `Result` containing the ID of the created texture or an error if the creation fails.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Destroys a GPU texture.
    /// ## Arguments
    /// * `id` - The ID of the texture to be destroyed.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Creates a graphics pipeline from the provided descriptor.
    /// ## Errors
    /// * `ResourceError::Pipeline` - If the backend cannot build the pipeline state.
    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<GraphicsPipelineId, ResourceError>;

    /// Creates a compute pipeline from the provided descriptor.
    /// ## Errors
    /// * `ResourceError::Pipeline` - If the backend cannot build the pipeline state.
    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError>;

    /// Destroys a graphics pipeline.
    fn destroy_graphics_pipeline(&self, id: GraphicsPipelineId) -> Result<(), ResourceError>;

    /// Destroys a compute pipeline.
    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError>;

    /// Creates a query object.
    /// ## Arguments
    /// * `kind` - The type of query.
    fn create_query(&self, kind: QueryKind) -> Result<QueryId, ResourceError>;

    /// Destroys a query object.
    fn destroy_query(&self, id: QueryId) -> Result<(), ResourceError>;

    /// Reads the result of the most recently ended instance of a query.
    /// ## Returns
    /// `Some(samples)` once the GPU has resolved the query, `None` while it is still
    /// pending or if it was never issued.
    fn read_query_result(&self, id: QueryId) -> Option<u64>;

    /// Creates a command encoder for recording one frame's commands.
    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder>;

    /// Submits a finished command buffer for execution.
    /// ## Returns
    /// The fence value that will be signalled when the submission completes.
    fn submit(&self, command_buffer: CommandBufferId) -> Result<FenceValue, RenderError>;

    /// Blocks until `fence` has been signalled.
    fn wait_for_fence(&self, fence: FenceValue) -> Result<(), RenderError>;

    /// The swapchain image to render into this frame.
    fn current_back_buffer(&self) -> TextureId;

    /// Resizes the swapchain. Back-buffer ids may change.
    fn resize_swapchain(&self, width: u32, height: u32) -> Result<(), RenderError>;

    /// Reports whether an optional capability is available.
    fn supports_feature(&self, feature: DeviceFeature) -> bool;
}
