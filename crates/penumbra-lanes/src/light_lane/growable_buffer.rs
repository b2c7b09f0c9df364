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

//! Structured buffers that grow with the number of records uploaded into them.

use crate::render_lane::{FrameResource, FrameResources, ResourceStateTracker};
use penumbra_core::renderer::{BufferDescriptor, BufferUsage, GraphicsDevice, RenderError};
use std::borrow::Cow;

/// The capacity, in bytes, a buffer of `current` bytes needs to hold `required`.
///
/// Never shrinks. Growth rounds up to the next power of two.
pub fn grown_capacity(current: u64, required: u64) -> u64 {
    if required <= current {
        current
    } else {
        required.next_power_of_two()
    }
}

/// A structured light buffer registered in the frame resources.
///
/// Uploads replace the whole content; there are no partial updates. When a frame
/// needs more room the buffer is destroyed and recreated, which is safe because the
/// previous frame has completed by the time lights are prepared.
#[derive(Debug)]
pub struct GrowableBuffer {
    resource: FrameResource,
    stride: u32,
    capacity: u64,
    reallocations: u32,
}

impl GrowableBuffer {
    /// Creates the buffer with room for `initial_records` records of `stride` bytes
    /// and registers it as `resource`.
    pub fn create(
        device: &dyn GraphicsDevice,
        resources: &mut FrameResources,
        resource: FrameResource,
        stride: u32,
        initial_records: u64,
    ) -> Result<Self, RenderError> {
        let mut buffer = Self {
            resource,
            stride,
            capacity: 0,
            reallocations: 0,
        };
        buffer.allocate(device, resources, stride as u64 * initial_records.max(1))?;
        buffer.reallocations = 0;
        Ok(buffer)
    }

    fn allocate(
        &mut self,
        device: &dyn GraphicsDevice,
        resources: &mut FrameResources,
        size: u64,
    ) -> Result<(), RenderError> {
        let id = device.create_buffer(&BufferDescriptor {
            label: Some(Cow::Owned(format!("{:?}", self.resource))),
            size,
            stride: self.stride,
            usage: BufferUsage::STRUCTURED | BufferUsage::COPY_DST,
            initial_state: self.resource.home_state(),
        })?;
        if let Some(old) = resources.replace_buffer(self.resource, id) {
            if let Err(e) = device.destroy_buffer(old) {
                log::warn!(
                    "GrowableBuffer: failed to destroy previous {:?} buffer: {e}",
                    self.resource
                );
            }
        }
        self.capacity = size;
        self.reallocations += 1;
        Ok(())
    }

    /// Grows the buffer if `required` bytes do not fit.
    ///
    /// # Returns
    ///
    /// `true` if the buffer was reallocated. Its tracked state is then reset to home.
    pub fn reserve(
        &mut self,
        device: &dyn GraphicsDevice,
        resources: &mut FrameResources,
        states: &mut ResourceStateTracker,
        required: u64,
    ) -> Result<bool, RenderError> {
        let wanted = grown_capacity(self.capacity, required);
        if wanted == self.capacity {
            return Ok(false);
        }
        log::debug!(
            "GrowableBuffer: growing {:?} from {} to {} bytes",
            self.resource,
            self.capacity,
            wanted
        );
        self.allocate(device, resources, wanted)?;
        states.reset_to_home(self.resource);
        Ok(true)
    }

    /// The registered resource.
    pub fn resource(&self) -> FrameResource {
        self.resource
    }

    /// Allocated size in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Size of one record.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Times the buffer was recreated after creation.
    pub fn reallocations(&self) -> u32 {
        self.reallocations
    }
}
