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

use ahash::{AHashMap, AHashSet};
use penumbra_core::renderer::{
    BufferDescriptor, BufferId, CommandBufferId, CommandEncoder, ComputePipelineDescriptor,
    ComputePipelineId, DeviceFeature, FenceValue, GraphicsDevice, GraphicsPipelineDescriptor,
    GraphicsPipelineId, PipelineError, QueryId, QueryKind, RenderError, ResourceError,
    ResourceState, TextureDescriptor, TextureId,
};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::command::{HeadlessCommandEncoder, RecordedCommand};
use super::validation::{replay, ResourceRef, StateViolation};

/// Swapchain images cycled by presentation.
pub const BACK_BUFFER_COUNT: usize = 2;

/// Largest texture edge accepted unless lowered with
/// [`HeadlessDevice::set_max_texture_dimension`].
pub const DEFAULT_MAX_TEXTURE_DIMENSION: u32 = 16384;

/// A summary of the most recent submission.
#[derive(Debug, Clone)]
pub struct Submission {
    /// Label the encoder was created with.
    pub label: Option<String>,
    /// The fence signalled by the submission.
    pub fence: FenceValue,
    /// Every recorded command, in order.
    pub commands: Vec<RecordedCommand>,
    /// Violations found in this submission alone.
    pub violations: Vec<StateViolation>,
}

impl Submission {
    /// Number of draw calls, indexed or not.
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. }
                )
            })
            .count()
    }

    /// Number of compute dispatches.
    pub fn dispatch_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Dispatch { .. }))
            .count()
    }

    /// Labels of the render and compute passes, in recording order.
    pub fn pass_labels(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::BeginRenderPass { label, .. }
                | RecordedCommand::BeginComputePass { label } => label.clone(),
                _ => None,
            })
            .collect()
    }

    /// Labels of the debug groups, in recording order.
    pub fn debug_groups(&self) -> Vec<String> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                RecordedCommand::PushDebugGroup(label) => Some(label.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug)]
struct TrackedResource {
    label: Option<String>,
    back_buffer: bool,
    bytes: u64,
}

#[derive(Debug, Default)]
struct QueryRecord {
    resolved: bool,
}

#[derive(Debug)]
struct PendingCommands {
    label: Option<String>,
    commands: Vec<RecordedCommand>,
}

#[derive(Debug)]
struct DeviceState {
    resources: AHashMap<ResourceRef, TrackedResource>,
    states: AHashMap<ResourceRef, ResourceState>,
    graphics_pipelines: AHashMap<GraphicsPipelineId, String>,
    compute_pipelines: AHashMap<ComputePipelineId, String>,
    queries: AHashMap<QueryId, QueryRecord>,
    query_results: AHashMap<QueryId, Option<u64>>,
    default_query_result: Option<u64>,
    fail_query_creation: bool,
    failing_pipelines: Vec<String>,
    unsupported_features: AHashSet<DeviceFeature>,
    max_texture_dimension: u32,
    memory_budget: Option<u64>,
    allocated_bytes: u64,
    lost: bool,
    pending: AHashMap<CommandBufferId, PendingCommands>,
    back_buffers: Vec<TextureId>,
    back_buffer_index: usize,
    swapchain_size: (u32, u32),
    last_fence: FenceValue,
    present_count: u64,
    violations: Vec<StateViolation>,
    last_submission: Option<Submission>,
}

pub(crate) struct DeviceShared {
    state: Mutex<DeviceState>,
    next_resource_id: AtomicUsize,
    next_command_buffer_id: AtomicU64,
}

impl DeviceShared {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> usize {
        self.next_resource_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn store_command_buffer(
        &self,
        label: Option<String>,
        commands: Vec<RecordedCommand>,
    ) -> CommandBufferId {
        let id = CommandBufferId(self.next_command_buffer_id.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .pending
            .insert(id, PendingCommands { label, commands });
        id
    }

    fn create_back_buffers(&self, state: &mut DeviceState, width: u32, height: u32) {
        for old in state.back_buffers.drain(..) {
            state.resources.remove(&ResourceRef::Texture(old));
            state.states.remove(&ResourceRef::Texture(old));
        }
        for index in 0..BACK_BUFFER_COUNT {
            let id = TextureId(self.next_id());
            let key = ResourceRef::Texture(id);
            state.resources.insert(
                key,
                TrackedResource {
                    label: Some(format!("BackBuffer{index}")),
                    back_buffer: true,
                    bytes: 0,
                },
            );
            state.states.insert(key, ResourceState::Present);
            state.back_buffers.push(id);
        }
        state.back_buffer_index = 0;
        state.swapchain_size = (width, height);
    }
}

/// A [`GraphicsDevice`] that executes nothing.
///
/// Every resource lives in a table together with its current access state. Command
/// buffers are recorded in memory and replayed on submit: each transition must name
/// the state the resource is actually in, and each attachment, binding, copy, clear
/// and present must find the resource in a state that permits the access. Misuse is
/// collected as [`StateViolation`]s instead of failing the submission.
///
/// Submission completes immediately, so every fence is signalled by the time
/// `submit` returns and occlusion queries ended in a submission are readable right
/// after it.
#[derive(Clone)]
pub struct HeadlessDevice {
    shared: Arc<DeviceShared>,
}

impl fmt::Debug for HeadlessDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("HeadlessDevice")
            .field("swapchain_size", &state.swapchain_size)
            .field("resources", &state.resources.len())
            .field("last_fence", &state.last_fence)
            .finish()
    }
}

impl HeadlessDevice {
    /// Creates a device whose swapchain has `width` x `height` back buffers.
    pub fn new(width: u32, height: u32) -> Self {
        let shared = Arc::new(DeviceShared {
            state: Mutex::new(DeviceState {
                resources: AHashMap::new(),
                states: AHashMap::new(),
                graphics_pipelines: AHashMap::new(),
                compute_pipelines: AHashMap::new(),
                queries: AHashMap::new(),
                query_results: AHashMap::new(),
                default_query_result: Some(1),
                fail_query_creation: false,
                failing_pipelines: Vec::new(),
                unsupported_features: AHashSet::new(),
                max_texture_dimension: DEFAULT_MAX_TEXTURE_DIMENSION,
                memory_budget: None,
                allocated_bytes: 0,
                lost: false,
                pending: AHashMap::new(),
                back_buffers: Vec::with_capacity(BACK_BUFFER_COUNT),
                back_buffer_index: 0,
                swapchain_size: (width, height),
                last_fence: FenceValue::default(),
                present_count: 0,
                violations: Vec::new(),
                last_submission: None,
            }),
            next_resource_id: AtomicUsize::new(1),
            next_command_buffer_id: AtomicU64::new(1),
        });
        {
            let mut state = shared.lock();
            shared.create_back_buffers(&mut state, width, height);
        }
        log::info!("HeadlessDevice: created with a {width}x{height} swapchain");
        Self { shared }
    }

    /// The sample count reported for resolved queries without an explicit result.
    /// `Some(0)` reports everything occluded; `None` never resolves.
    pub fn set_default_query_result(&self, samples: Option<u64>) {
        self.shared.lock().default_query_result = samples;
    }

    /// Overrides the result of one query.
    pub fn set_query_result(&self, query: QueryId, samples: Option<u64>) {
        self.shared.lock().query_results.insert(query, samples);
    }

    /// Makes every following `create_query` fail.
    pub fn set_query_creation_failure(&self, fail: bool) {
        self.shared.lock().fail_query_creation = fail;
    }

    /// Lowers or raises the largest accepted texture edge.
    pub fn set_max_texture_dimension(&self, max: u32) {
        self.shared.lock().max_texture_dimension = max;
    }

    /// Caps the bytes of live buffers and textures. Allocations past the cap fail with
    /// [`ResourceError::OutOfMemory`]. `None` removes the cap.
    pub fn set_memory_budget(&self, bytes: Option<u64>) {
        self.shared.lock().memory_budget = bytes;
    }

    /// Bytes held by live buffers and textures, not counting swapchain images.
    pub fn allocated_bytes(&self) -> u64 {
        self.shared.lock().allocated_bytes
    }

    /// Simulates a device removal: every later `submit` and `wait_for_fence` fails
    /// with [`RenderError::DeviceLost`].
    pub fn lose_device(&self) {
        self.shared.lock().lost = true;
        log::warn!("HeadlessDevice: device lost");
    }

    /// Makes pipeline creation fail for every label containing `pattern`.
    pub fn fail_pipelines_matching(&self, pattern: impl Into<String>) {
        self.shared.lock().failing_pipelines.push(pattern.into());
    }

    /// Turns an optional capability on or off.
    pub fn set_feature_support(&self, feature: DeviceFeature, supported: bool) {
        let mut state = self.shared.lock();
        if supported {
            state.unsupported_features.remove(&feature);
        } else {
            state.unsupported_features.insert(feature);
        }
    }

    /// Live textures, not counting swapchain images.
    pub fn live_texture_count(&self) -> usize {
        self.shared
            .lock()
            .resources
            .iter()
            .filter(|(key, r)| matches!(key, ResourceRef::Texture(_)) && !r.back_buffer)
            .count()
    }

    /// Live buffers.
    pub fn live_buffer_count(&self) -> usize {
        self.shared
            .lock()
            .resources
            .keys()
            .filter(|key| matches!(key, ResourceRef::Buffer(_)))
            .count()
    }

    /// Live graphics and compute pipelines.
    pub fn live_pipeline_count(&self) -> usize {
        let state = self.shared.lock();
        state.graphics_pipelines.len() + state.compute_pipelines.len()
    }

    /// Live query objects.
    pub fn live_query_count(&self) -> usize {
        self.shared.lock().queries.len()
    }

    /// The device-side state of a texture.
    pub fn texture_state(&self, id: TextureId) -> Option<ResourceState> {
        self.shared
            .lock()
            .states
            .get(&ResourceRef::Texture(id))
            .copied()
    }

    /// The device-side state of a buffer.
    pub fn buffer_state(&self, id: BufferId) -> Option<ResourceState> {
        self.shared
            .lock()
            .states
            .get(&ResourceRef::Buffer(id))
            .copied()
    }

    /// The debug label a texture was created with.
    pub fn texture_label(&self, id: TextureId) -> Option<String> {
        self.shared
            .lock()
            .resources
            .get(&ResourceRef::Texture(id))
            .and_then(|r| r.label.clone())
    }

    /// Every violation found since creation or the last [`take_violations`](Self::take_violations).
    pub fn violations(&self) -> Vec<StateViolation> {
        self.shared.lock().violations.clone()
    }

    /// Drains the collected violations.
    pub fn take_violations(&self) -> Vec<StateViolation> {
        std::mem::take(&mut self.shared.lock().violations)
    }

    /// The most recent submission.
    pub fn last_submission(&self) -> Option<Submission> {
        self.shared.lock().last_submission.clone()
    }

    /// Number of present commands executed.
    pub fn present_count(&self) -> u64 {
        self.shared.lock().present_count
    }

    /// Current swapchain size.
    pub fn swapchain_size(&self) -> (u32, u32) {
        self.shared.lock().swapchain_size
    }

    fn check_pipeline(
        &self,
        label: &str,
        required: Option<DeviceFeature>,
    ) -> Result<(), ResourceError> {
        let state = self.shared.lock();
        if state
            .failing_pipelines
            .iter()
            .any(|pattern| label.contains(pattern.as_str()))
        {
            return Err(PipelineError::CompilationFailed {
                label: Some(label.to_string()),
                details: "rejected by the headless device".to_string(),
            }
            .into());
        }
        if let Some(feature) = required.filter(|f| state.unsupported_features.contains(f)) {
            return Err(PipelineError::FeatureNotSupported(format!("{feature:?}")).into());
        }
        Ok(())
    }

    /// Charges `bytes` against the memory budget.
    fn allocate(&self, bytes: u64) -> Result<(), ResourceError> {
        let mut state = self.shared.lock();
        if let Some(budget) = state.memory_budget {
            if state.allocated_bytes.saturating_add(bytes) > budget {
                return Err(ResourceError::OutOfMemory {
                    requested_bytes: bytes,
                });
            }
        }
        state.allocated_bytes += bytes;
        Ok(())
    }

    fn insert_resource(
        &self,
        key: ResourceRef,
        label: Option<String>,
        initial: ResourceState,
        bytes: u64,
    ) {
        let mut state = self.shared.lock();
        state.resources.insert(
            key,
            TrackedResource {
                label,
                back_buffer: false,
                bytes,
            },
        );
        state.states.insert(key, initial);
    }

    fn remove_resource(&self, key: ResourceRef) -> Result<(), ResourceError> {
        let mut state = self.shared.lock();
        match state.resources.get(&key) {
            None => return Err(ResourceError::NotFound),
            Some(r) if r.back_buffer => return Err(ResourceError::InvalidHandle),
            Some(_) => {}
        }
        if let Some(resource) = state.resources.remove(&key) {
            state.allocated_bytes = state.allocated_bytes.saturating_sub(resource.bytes);
        }
        state.states.remove(&key);
        Ok(())
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        if descriptor.size == 0 {
            return Err(ResourceError::BackendError(format!(
                "buffer '{}' has zero size",
                descriptor.label.as_deref().unwrap_or("unnamed")
            )));
        }
        self.allocate(descriptor.size)?;
        let id = BufferId(self.shared.next_id());
        self.insert_resource(
            ResourceRef::Buffer(id),
            descriptor.label.as_ref().map(|l| l.to_string()),
            descriptor.initial_state,
            descriptor.size,
        );
        log::trace!("HeadlessDevice: created buffer {id:?} ({} bytes)", descriptor.size);
        Ok(id)
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.remove_resource(ResourceRef::Buffer(id))
    }

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let label = descriptor.label.as_deref().unwrap_or("unnamed");
        let max = self.shared.lock().max_texture_dimension;
        if descriptor.width == 0 || descriptor.height == 0 {
            return Err(ResourceError::BackendError(format!(
                "texture '{label}' has a zero dimension"
            )));
        }
        if descriptor.width > max || descriptor.height > max {
            return Err(ResourceError::BackendError(format!(
                "texture '{label}' is {}x{}, the device limit is {max}",
                descriptor.width, descriptor.height
            )));
        }
        let bytes = descriptor.size_in_bytes();
        self.allocate(bytes)?;
        let id = TextureId(self.shared.next_id());
        self.insert_resource(
            ResourceRef::Texture(id),
            Some(label.to_string()),
            descriptor.initial_state,
            bytes,
        );
        log::trace!("HeadlessDevice: created texture {id:?} '{label}' ({bytes} bytes)");
        Ok(id)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        self.remove_resource(ResourceRef::Texture(id))
    }

    fn create_graphics_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<GraphicsPipelineId, ResourceError> {
        self.check_pipeline(&descriptor.label, None)?;
        let id = GraphicsPipelineId(self.shared.next_id());
        self.shared
            .lock()
            .graphics_pipelines
            .insert(id, descriptor.label.clone());
        Ok(id)
    }

    fn create_compute_pipeline(
        &self,
        descriptor: &ComputePipelineDescriptor,
    ) -> Result<ComputePipelineId, ResourceError> {
        self.check_pipeline(&descriptor.label, None)?;
        let id = ComputePipelineId(self.shared.next_id());
        self.shared
            .lock()
            .compute_pipelines
            .insert(id, descriptor.label.clone());
        Ok(id)
    }

    fn destroy_graphics_pipeline(&self, id: GraphicsPipelineId) -> Result<(), ResourceError> {
        self.shared
            .lock()
            .graphics_pipelines
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn destroy_compute_pipeline(&self, id: ComputePipelineId) -> Result<(), ResourceError> {
        self.shared
            .lock()
            .compute_pipelines
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_query(&self, kind: QueryKind) -> Result<QueryId, ResourceError> {
        let mut state = self.shared.lock();
        if state.fail_query_creation {
            return Err(ResourceError::BackendError(
                "query heap exhausted".to_string(),
            ));
        }
        if kind == QueryKind::Occlusion
            && state
                .unsupported_features
                .contains(&DeviceFeature::OcclusionQueries)
        {
            return Err(PipelineError::FeatureNotSupported("occlusion queries".to_string()).into());
        }
        let id = QueryId(self.shared.next_id());
        state.queries.insert(id, QueryRecord::default());
        Ok(id)
    }

    fn destroy_query(&self, id: QueryId) -> Result<(), ResourceError> {
        let mut state = self.shared.lock();
        state.query_results.remove(&id);
        state
            .queries
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn read_query_result(&self, id: QueryId) -> Option<u64> {
        let state = self.shared.lock();
        let record = state.queries.get(&id)?;
        if !record.resolved {
            return None;
        }
        state
            .query_results
            .get(&id)
            .copied()
            .unwrap_or(state.default_query_result)
    }

    fn create_command_encoder(&self, label: Option<&str>) -> Box<dyn CommandEncoder> {
        Box::new(HeadlessCommandEncoder {
            label: label.map(str::to_string),
            commands: Vec::new(),
            device: Arc::clone(&self.shared),
        })
    }

    fn submit(&self, command_buffer: CommandBufferId) -> Result<FenceValue, RenderError> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        if state.lost {
            state.pending.remove(&command_buffer);
            return Err(RenderError::DeviceLost);
        }
        let pending = state
            .pending
            .remove(&command_buffer)
            .ok_or(RenderError::ResourceError(ResourceError::InvalidHandle))?;

        let mut violations = Vec::new();
        let outcome = replay(
            command_buffer,
            &pending.commands,
            &mut state.states,
            &mut violations,
        );
        for violation in &violations {
            log::warn!("HeadlessDevice: {violation}");
        }

        for query in outcome.ended_queries {
            if let Some(record) = state.queries.get_mut(&query) {
                record.resolved = true;
            }
        }
        for _ in outcome.presented {
            state.present_count += 1;
            state.back_buffer_index = (state.back_buffer_index + 1) % BACK_BUFFER_COUNT;
        }

        state.last_fence = FenceValue(state.last_fence.0 + 1);
        let fence = state.last_fence;
        state.violations.extend(violations.iter().cloned());
        state.last_submission = Some(Submission {
            label: pending.label,
            fence,
            commands: pending.commands,
            violations,
        });
        Ok(fence)
    }

    fn wait_for_fence(&self, fence: FenceValue) -> Result<(), RenderError> {
        let state = self.shared.lock();
        if state.lost {
            return Err(RenderError::DeviceLost);
        }
        let last = state.last_fence;
        if fence > last {
            return Err(RenderError::RenderingFailed(format!(
                "waiting on fence {} which was never submitted (last {})",
                fence.0, last.0
            )));
        }
        Ok(())
    }

    fn current_back_buffer(&self) -> TextureId {
        let state = self.shared.lock();
        state.back_buffers[state.back_buffer_index]
    }

    fn resize_swapchain(&self, width: u32, height: u32) -> Result<(), RenderError> {
        let mut state = self.shared.lock();
        let max = state.max_texture_dimension;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::ResizeFailed {
                width,
                height,
                reason: "swapchain size out of range".to_string(),
            });
        }
        self.shared.create_back_buffers(&mut state, width, height);
        log::debug!("HeadlessDevice: swapchain resized to {width}x{height}");
        Ok(())
    }

    fn supports_feature(&self, feature: DeviceFeature) -> bool {
        !self
            .shared
            .lock()
            .unsupported_features
            .contains(&feature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use penumbra_core::renderer::{
        BufferUsage, ColorAttachment, RenderPassDescriptor, ShaderProgram, TextureDimension,
        TextureFormat, TextureUsage,
    };
    use std::borrow::Cow;

    fn target(device: &HeadlessDevice, state: ResourceState) -> TextureId {
        device
            .create_texture(&TextureDescriptor {
                label: Some(Cow::Borrowed("target")),
                width: 64,
                height: 64,
                array_layers: 1,
                mip_levels: 1,
                format: TextureFormat::Rgba8Unorm,
                dimension: TextureDimension::D2,
                usage: TextureUsage::RENDER_TARGET,
                initial_state: state,
            })
            .expect("texture")
    }

    #[test]
    fn test_valid_stream_has_no_violations() {
        let device = HeadlessDevice::new(64, 64);
        let texture = target(&device, ResourceState::PixelShaderResource);
        let mut encoder = device.create_command_encoder(Some("frame"));
        encoder.push_debug_group("Frame");
        encoder.transition_texture(
            texture,
            ResourceState::PixelShaderResource,
            ResourceState::RenderTarget,
        );
        {
            let attachments = [ColorAttachment::clear(texture, [0.0; 4])];
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some(Cow::Borrowed("Clear")),
                color_attachments: &attachments,
                depth_attachment: None,
            });
            pass.draw(0..3, 0..1);
        }
        encoder.transition_texture(
            texture,
            ResourceState::RenderTarget,
            ResourceState::PixelShaderResource,
        );
        encoder.pop_debug_group();
        let fence = device.submit(encoder.finish()).expect("submit");

        assert_eq!(fence, FenceValue(1));
        assert!(device.violations().is_empty());
        let submission = device.last_submission().expect("submission");
        assert_eq!(submission.draw_count(), 1);
        assert_eq!(submission.pass_labels(), vec!["Clear".to_string()]);
        assert_eq!(
            device.texture_state(texture),
            Some(ResourceState::PixelShaderResource)
        );
    }

    #[test]
    fn test_attachment_in_wrong_state_is_reported() {
        let device = HeadlessDevice::new(64, 64);
        let texture = target(&device, ResourceState::PixelShaderResource);
        let mut encoder = device.create_command_encoder(None);
        {
            let attachments = [ColorAttachment::load(texture)];
            let _pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &attachments,
                depth_attachment: None,
            });
        }
        device.submit(encoder.finish()).expect("submit");
        let violations = device.take_violations();
        assert_eq!(violations.len(), 1);
        assert!(device.violations().is_empty());
    }

    #[test]
    fn test_queries_resolve_on_submit() {
        let device = HeadlessDevice::new(64, 64);
        device.set_default_query_result(Some(0));
        let query = device.create_query(QueryKind::Occlusion).expect("query");
        assert_eq!(device.read_query_result(query), None);

        let mut encoder = device.create_command_encoder(None);
        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: None,
                color_attachments: &[],
                depth_attachment: None,
            });
            pass.begin_query(query);
            pass.draw(0..36, 0..1);
            pass.end_query(query);
        }
        let command_buffer = encoder.finish();
        assert_eq!(device.read_query_result(query), None);
        device.submit(command_buffer).expect("submit");
        assert_eq!(device.read_query_result(query), Some(0));

        device.set_query_result(query, Some(12));
        assert_eq!(device.read_query_result(query), Some(12));
        device.destroy_query(query).expect("destroy");
        assert_eq!(device.read_query_result(query), None);
        assert_eq!(device.live_query_count(), 0);
    }

    #[test]
    fn test_present_cycles_back_buffers() {
        let device = HeadlessDevice::new(64, 64);
        let first = device.current_back_buffer();
        let mut encoder = device.create_command_encoder(None);
        encoder.present(first, true);
        device.submit(encoder.finish()).expect("submit");
        assert_eq!(device.present_count(), 1);
        assert_ne!(device.current_back_buffer(), first);
        assert!(device.violations().is_empty());
    }

    #[test]
    fn test_resize_swapchain() {
        let device = HeadlessDevice::new(64, 64);
        let before = device.current_back_buffer();
        device.resize_swapchain(128, 32).expect("resize");
        assert_eq!(device.swapchain_size(), (128, 32));
        assert_ne!(device.current_back_buffer(), before);
        assert_eq!(device.texture_state(before), None);
        assert_eq!(device.live_texture_count(), 0);
        assert!(matches!(
            device.resize_swapchain(0, 32),
            Err(RenderError::ResizeFailed { width: 0, .. })
        ));
    }

    #[test]
    fn test_fences() {
        let device = HeadlessDevice::new(64, 64);
        assert!(device.wait_for_fence(FenceValue(0)).is_ok());
        assert!(device.wait_for_fence(FenceValue(1)).is_err());
        let encoder = device.create_command_encoder(None);
        let fence = device.submit(encoder.finish()).expect("submit");
        assert!(device.wait_for_fence(fence).is_ok());
        assert!(matches!(
            device.submit(CommandBufferId(999)),
            Err(RenderError::ResourceError(ResourceError::InvalidHandle))
        ));
    }

    #[test]
    fn test_resource_limits_and_lifetimes() {
        let device = HeadlessDevice::new(64, 64);
        device.set_max_texture_dimension(32);
        let too_large = device.create_texture(&TextureDescriptor {
            label: None,
            width: 64,
            height: 16,
            array_layers: 1,
            mip_levels: 1,
            format: TextureFormat::Rgba8Unorm,
            dimension: TextureDimension::D2,
            usage: TextureUsage::SHADER_RESOURCE,
            initial_state: ResourceState::PixelShaderResource,
        });
        assert!(matches!(too_large, Err(ResourceError::BackendError(_))));

        let buffer = device
            .create_buffer(&BufferDescriptor {
                label: Some(Cow::Borrowed("constants")),
                size: 256,
                stride: 0,
                usage: BufferUsage::CONSTANT,
                initial_state: ResourceState::ConstantBuffer,
            })
            .expect("buffer");
        assert_eq!(device.live_buffer_count(), 1);
        assert_eq!(device.buffer_state(buffer), Some(ResourceState::ConstantBuffer));
        device.destroy_buffer(buffer).expect("destroy");
        assert!(matches!(device.destroy_buffer(buffer), Err(ResourceError::NotFound)));

        let back_buffer = device.current_back_buffer();
        assert!(matches!(
            device.destroy_texture(back_buffer),
            Err(ResourceError::InvalidHandle)
        ));
    }

    #[test]
    fn test_pipeline_failure_injection() {
        let device = HeadlessDevice::new(64, 64);
        device.fail_pipelines_matching("Tiled");
        let failed = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: "TiledLighting".to_string(),
            program: ShaderProgram::new("TiledLighting.cs"),
        });
        assert!(matches!(
            failed,
            Err(ResourceError::Pipeline(PipelineError::CompilationFailed { .. }))
        ));
        let ok = device
            .create_compute_pipeline(&ComputePipelineDescriptor {
                label: "Ssao".to_string(),
                program: ShaderProgram::new("Ssao.cs"),
            })
            .expect("pipeline");
        assert_eq!(device.live_pipeline_count(), 1);
        device.destroy_compute_pipeline(ok).expect("destroy");
        assert_eq!(device.live_pipeline_count(), 0);
    }

    #[test]
    fn test_feature_support() {
        let device = HeadlessDevice::new(64, 64);
        assert!(device.supports_feature(DeviceFeature::VariableRateShadingImage));
        device.set_feature_support(DeviceFeature::OcclusionQueries, false);
        assert!(!device.supports_feature(DeviceFeature::OcclusionQueries));
        assert!(device.create_query(QueryKind::Occlusion).is_err());
    }

    #[test]
    fn test_memory_budget_rejects_allocations() {
        let device = HeadlessDevice::new(64, 64);
        // One 64x64 Rgba8 target is 16 KiB.
        device.set_memory_budget(Some(20 * 1024));
        let first = target(&device, ResourceState::PixelShaderResource);
        assert_eq!(device.allocated_bytes(), 16 * 1024);

        let second = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Borrowed("too much")),
            size: 8 * 1024,
            stride: 0,
            usage: BufferUsage::CONSTANT,
            initial_state: ResourceState::ConstantBuffer,
        });
        assert!(matches!(
            second,
            Err(ResourceError::OutOfMemory {
                requested_bytes: 8192
            })
        ));
        assert_eq!(device.live_buffer_count(), 0);

        device.destroy_texture(first).expect("destroy");
        assert_eq!(device.allocated_bytes(), 0);
        device.set_memory_budget(None);
        assert!(device
            .create_buffer(&BufferDescriptor {
                label: None,
                size: 1 << 30,
                stride: 0,
                usage: BufferUsage::CONSTANT,
                initial_state: ResourceState::ConstantBuffer,
            })
            .is_ok());
    }

    #[test]
    fn test_lost_device_fails_submit_and_wait() {
        let device = HeadlessDevice::new(64, 64);
        let encoder = device.create_command_encoder(None);
        let fence = device.submit(encoder.finish()).expect("submit");

        device.lose_device();
        assert!(matches!(device.wait_for_fence(fence), Err(RenderError::DeviceLost)));
        let encoder = device.create_command_encoder(None);
        assert!(matches!(device.submit(encoder.finish()), Err(RenderError::DeviceLost)));
    }
}
