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

//! Visibility lane: which drawables each view sees, and how they are grouped into
//! draw batches.

mod batch_builder;
mod frustum_culler;
mod occlusion_tracker;

pub use batch_builder::*;
pub use frustum_culler::*;
pub use occlusion_tracker::*;

use penumbra_data::light::POINT_LIGHT_FACE_COUNT;
use penumbra_data::{DrawableHandle, PointLightHandle};

/// What the camera sees this frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraVisibility {
    /// Drawables with at least one forward-shaded material, in scan order.
    pub forward: Vec<DrawableHandle>,
    /// All other visible drawables, nearest first.
    pub deferred: Vec<DrawableHandle>,
}

impl CameraVisibility {
    /// Total number of camera-visible drawables.
    pub fn len(&self) -> usize {
        self.forward.len() + self.deferred.len()
    }

    /// Returns `true` if the camera sees nothing.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty() && self.deferred.is_empty()
    }
}

/// What one point light sees, partitioned for every shadow rendering strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLightVisibility {
    /// The light.
    pub light: PointLightHandle,
    /// Drawables visible in each cube face.
    pub per_face: [Vec<DrawableHandle>; POINT_LIGHT_FACE_COUNT],
    /// Drawables visible in any face.
    pub single_pass: Vec<DrawableHandle>,
    /// Drawables visible in faces 0-2 and faces 3-5.
    pub two_pass: [Vec<DrawableHandle>; 2],
}

impl PointLightVisibility {
    /// Empty sets for `light`.
    pub fn new(light: PointLightHandle) -> Self {
        Self {
            light,
            per_face: Default::default(),
            single_pass: Vec::new(),
            two_pass: Default::default(),
        }
    }

    fn append(&mut self, other: PointLightVisibility) {
        for (dst, src) in self.per_face.iter_mut().zip(other.per_face) {
            dst.extend(src);
        }
        self.single_pass.extend(other.single_pass);
        for (dst, src) in self.two_pass.iter_mut().zip(other.two_pass) {
            dst.extend(src);
        }
    }
}

/// Every visibility set of a frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisibilitySets {
    /// Camera sets.
    pub camera: CameraVisibility,
    /// One entry per point light, in scene order.
    pub point_lights: Vec<PointLightVisibility>,
    /// Drawables rendered into every sun cascade. Not culled.
    pub directional: Vec<DrawableHandle>,
}
