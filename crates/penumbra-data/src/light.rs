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

//! Scene lights.
//!
//! A point light owns the six face frustums of its shadow cube, recomputed whenever
//! its position or range changes. Its range is not authored: it follows from the
//! light's brightness and a minimum-luma floor.

use penumbra_core::math::{Frustum, Mat4, Vec3, FRAC_PI_2};

/// Near plane of every point-light shadow face.
pub const POINT_LIGHT_SHADOW_NEAR: f32 = 0.1;
/// Faces in a shadow cube.
pub const POINT_LIGHT_FACE_COUNT: usize = 6;
/// Brightness below which a light no longer contributes visibly.
pub const MIN_LUMA: f32 = 0.005;
/// Rec. 709 luma weights.
pub const LUMA_WEIGHTS: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);

/// Look direction and up vector of each cube face, in +X, -X, +Y, -Y, +Z, -Z order.
const FACE_BASIS: [(Vec3, Vec3); POINT_LIGHT_FACE_COUNT] = [
    (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
    (Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
    (Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, -1.0)),
    (Vec3::new(0.0, -1.0, 0.0), Vec3::new(0.0, 0.0, 1.0)),
    (Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 1.0, 0.0)),
    (Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 1.0, 0.0)),
];

/// Influence radius of a light of linear `radiance` (color times intensity).
///
/// `radius = sqrt(dot(radiance, LUMA_WEIGHTS) / MIN_LUMA)`
pub fn light_radius(radiance: Vec3) -> f32 {
    (radiance.dot(LUMA_WEIGHTS).max(0.0) / MIN_LUMA).sqrt()
}

/// One face of a point light's shadow cube.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLightFace {
    /// World to face-view transform.
    pub view: Mat4,
    /// 90 degree perspective projection.
    pub projection: Mat4,
    /// `projection * view`.
    pub view_projection: Mat4,
    /// Culling volume of the face.
    pub frustum: Frustum,
}

impl PointLightFace {
    fn new(position: Vec3, face: usize, far: f32) -> Self {
        let (direction, up) = FACE_BASIS[face];
        // The basis vectors are never parallel, so this cannot fail.
        let view = Mat4::look_at_rh(position, position + direction, up).unwrap_or_default();
        let projection = Mat4::perspective_rh_zo(FRAC_PI_2, 1.0, POINT_LIGHT_SHADOW_NEAR, far);
        let view_projection = projection * view;
        Self {
            view,
            projection,
            view_projection,
            frustum: Frustum::from_view_projection(&view_projection),
        }
    }
}

/// An omnidirectional light.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLight {
    position: Vec3,
    color: Vec3,
    intensity: f32,
    radius: f32,
    faces: [PointLightFace; POINT_LIGHT_FACE_COUNT],
    /// Whether this light renders a shadow cube.
    pub casts_shadows: bool,
    /// Constant depth bias of the shadow lookup.
    pub shadow_bias: f32,
    /// Upper bound of the slope-scaled bias.
    pub max_shadow_bias: f32,
}

impl PointLight {
    /// Creates a light and computes its radius and face frustums.
    pub fn new(position: Vec3, color: Vec3, intensity: f32) -> Self {
        let radius = light_radius(color * intensity);
        let far = shadow_far(radius);
        let faces = std::array::from_fn(|face| PointLightFace::new(position, face, far));
        Self {
            position,
            color,
            intensity,
            radius,
            faces,
            casts_shadows: false,
            shadow_bias: 0.005,
            max_shadow_bias: 0.05,
        }
    }

    /// Enables shadow casting, builder-style.
    pub fn with_shadows(mut self) -> Self {
        self.casts_shadows = true;
        self
    }

    /// Returns `true` if the light renders a shadow cube.
    pub fn is_shadow_caster(&self) -> bool {
        self.casts_shadows
    }

    /// World-space position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Linear color.
    pub fn color(&self) -> Vec3 {
        self.color
    }

    /// Scalar intensity.
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// `color * intensity`.
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }

    /// Influence radius, also the far plane of the shadow faces.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Far plane of the shadow faces.
    pub fn shadow_far_plane(&self) -> f32 {
        shadow_far(self.radius)
    }

    /// The six shadow faces in cube order.
    pub fn faces(&self) -> &[PointLightFace; POINT_LIGHT_FACE_COUNT] {
        &self.faces
    }

    /// Moves the light.
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_faces();
    }

    /// Changes color and intensity, which changes the radius.
    pub fn set_color(&mut self, color: Vec3, intensity: f32) {
        self.color = color;
        self.intensity = intensity;
        self.radius = light_radius(self.radiance());
        self.update_faces();
    }

    fn update_faces(&mut self) {
        let far = shadow_far(self.radius);
        for (face, slot) in self.faces.iter_mut().enumerate() {
            *slot = PointLightFace::new(self.position, face, far);
        }
    }
}

/// Keeps the projection valid for lights too dim to have a meaningful range.
fn shadow_far(radius: f32) -> f32 {
    radius.max(POINT_LIGHT_SHADOW_NEAR * 2.0)
}

/// The sun.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels in.
    pub direction: Vec3,
    /// Linear color.
    pub color: Vec3,
    /// Scalar intensity.
    pub intensity: f32,
    /// Depth bias of the cascade lookup.
    pub shadow_bias: f32,
    /// Blend between logarithmic (1.0) and uniform (0.0) cascade splits.
    pub cascade_split_lambda: f32,
    /// Whether the sun renders cascaded shadows.
    pub casts_shadows: bool,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(-0.3, -1.0, -0.4),
            color: Vec3::ONE,
            intensity: 3.0,
            shadow_bias: 0.0015,
            cascade_split_lambda: 0.75,
            casts_shadows: true,
        }
    }
}

impl DirectionalLight {
    /// `color * intensity`.
    pub fn radiance(&self) -> Vec3 {
        self.color * self.intensity
    }

    /// Unit direction; falls back to straight down for a zero vector.
    pub fn normalized_direction(&self) -> Vec3 {
        let dir = self.direction.normalize();
        if dir == Vec3::ZERO {
            Vec3::new(0.0, -1.0, 0.0)
        } else {
            dir
        }
    }

    /// An up vector that is never parallel to the light direction.
    pub fn up(&self) -> Vec3 {
        let dir = self.normalized_direction();
        if dir.dot(Vec3::Y).abs() > 0.99 {
            Vec3::Z
        } else {
            Vec3::Y
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use penumbra_core::math::Aabb;

    #[test]
    fn test_radius_from_luma() {
        // A white light of luma 0.125 reaches exactly 5 units.
        let light = PointLight::new(Vec3::ZERO, Vec3::ONE, 0.125);
        assert_relative_eq!(light.radius(), 5.0, epsilon = 1e-4);
        assert_relative_eq!(light_radius(Vec3::ZERO), 0.0);
    }

    #[test]
    fn test_faces_cover_their_axis_only() {
        let light = PointLight::new(Vec3::ZERO, Vec3::ONE, 0.125);
        let on_pos_x = Aabb::from_center_half_extents(Vec3::new(3.0, 0.0, 0.0), Vec3::splat(0.5));
        let visible: Vec<bool> = light
            .faces()
            .iter()
            .map(|face| face.frustum.intersects_aabb(&on_pos_x))
            .collect();
        assert_eq!(visible, vec![true, false, false, false, false, false]);
    }

    #[test]
    fn test_faces_follow_the_light() {
        let mut light = PointLight::new(Vec3::ZERO, Vec3::ONE, 0.125);
        let target = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -13.0), Vec3::splat(0.5));
        assert!(!light.faces()[5].frustum.intersects_aabb(&target));

        light.set_position(Vec3::new(0.0, 0.0, -10.0));
        assert!(light.faces()[5].frustum.intersects_aabb(&target));
    }

    #[test]
    fn test_dim_light_keeps_valid_projection() {
        let light = PointLight::new(Vec3::ZERO, Vec3::ZERO, 0.0);
        assert!(light.shadow_far_plane() > POINT_LIGHT_SHADOW_NEAR);
    }

    #[test]
    fn test_directional_up_is_not_parallel() {
        let sun = DirectionalLight {
            direction: Vec3::new(0.0, -1.0, 0.0),
            ..Default::default()
        };
        assert_eq!(sun.up(), Vec3::Z);
    }
}
