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

//! Bounding volumes and the frustum test used by every culling path.

use super::{Mat4, Vec3, Vec4, EPSILON};
use serde::{Deserialize, Serialize};

/// An Axis-Aligned Bounding Box (AABB).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// The corner of the box with the smallest coordinates on all axes.
    pub min: Vec3,
    /// The corner of the box with the largest coordinates on all axes.
    pub max: Vec3,
}

impl Aabb {
    /// Creates a new `Aabb` from two corner points, ordering them per axis.
    #[inline]
    pub fn from_min_max(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Creates a new `Aabb` from a center point and its half-extents.
    #[inline]
    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        let half = half_extents.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Calculates the center point of the box.
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Calculates the half-extents of the box.
    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Calculates the full size of the box.
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Checks if this `Aabb` overlaps another one (touching counts).
    #[inline]
    pub fn intersects_aabb(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Computes the world-space box enclosing this box after `matrix` is applied.
    ///
    /// The center is transformed as a point and the extents are projected onto the
    /// absolute values of the matrix's linear part, which is exact for translation and
    /// scale and conservative under rotation.
    pub fn transform(&self, matrix: &Mat4) -> Self {
        let center = matrix.transform_point3(self.center());
        let half = self.half_extents();

        let mut new_half = Vec3::ZERO;
        for (axis, extent) in [half.x, half.y, half.z].into_iter().enumerate() {
            let col = matrix.cols[axis].truncate().abs();
            new_half = new_half + col * extent;
        }

        Self::from_center_half_extents(center, new_half)
    }
}

/// A plane in Hessian normal form: `dot(normal, p) + d = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal. Points towards the inside of the owning frustum.
    pub normal: Vec3,
    /// Signed distance term.
    pub d: f32,
}

impl Plane {
    /// Builds a plane from raw `(a, b, c, d)` coefficients and normalizes it.
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.truncate();
        let len = normal.length();
        if len > EPSILON {
            Self {
                normal: normal / len,
                d: coefficients.w / len,
            }
        } else {
            Self { normal, d: coefficients.w }
        }
    }

    /// Signed distance from `point` to the plane. Positive values are on the inside.
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// A six-plane convex view volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far, all facing inwards.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the six planes of a column-major view-projection matrix with a `[0, 1]`
    /// clip depth range.
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    /// Builds a frustum from separate view and projection matrices.
    #[inline]
    pub fn from_view_and_projection(view: &Mat4, projection: &Mat4) -> Self {
        Self::from_view_projection(&(*projection * *view))
    }

    /// Tests whether `aabb` intersects the frustum.
    ///
    /// For each plane only the box corner furthest along the plane normal is tested; if
    /// that corner is behind any plane the box is entirely outside. The test is
    /// conservative: boxes near frustum edges may be reported as intersecting.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            plane.signed_distance(positive) >= 0.0
        })
    }

    /// Tests whether a point lies inside all six planes.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera_frustum() -> Frustum {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y)
            .expect("valid view");
        let proj = Mat4::perspective_rh_zo(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        Frustum::from_view_and_projection(&view, &proj)
    }

    #[test]
    fn test_aabb_transform_translation_and_scale() {
        let aabb = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::ONE);
        let m =
            Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)) * Mat4::from_scale(Vec3::splat(2.0));
        let world = aabb.transform(&m);
        assert_relative_eq!(world.min, Vec3::new(3.0, -2.0, -2.0));
        assert_relative_eq!(world.max, Vec3::new(7.0, 2.0, 2.0));
    }

    #[test]
    fn test_aabb_transform_rotation_is_conservative() {
        let aabb = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::ONE);
        let world = aabb.transform(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let expected = std::f32::consts::SQRT_2;
        assert_relative_eq!(world.max.x, expected, epsilon = 1e-5);
        assert_relative_eq!(world.max.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_frustum_contains_box_in_front() {
        let frustum = camera_frustum();
        let aabb = Aabb::from_min_max(Vec3::splat(-1.0), Vec3::ONE);
        assert!(frustum.intersects_aabb(&aabb));
        assert!(frustum.contains_point(Vec3::ZERO));
    }

    #[test]
    fn test_frustum_rejects_box_behind_camera() {
        let frustum = camera_frustum();
        let behind = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, 20.0), Vec3::ONE);
        assert!(!frustum.intersects_aabb(&behind));
    }

    #[test]
    fn test_frustum_rejects_box_beyond_far_plane() {
        let frustum = camera_frustum();
        let far = Aabb::from_center_half_extents(Vec3::new(0.0, 0.0, -200.0), Vec3::ONE);
        assert!(!frustum.intersects_aabb(&far));
    }

    #[test]
    fn test_frustum_accepts_box_straddling_side_plane() {
        let frustum = camera_frustum();
        // At distance 10 the 90 degree frustum spans x in [-10, 10].
        let straddling = Aabb::from_center_half_extents(Vec3::new(10.5, 0.0, 0.0), Vec3::ONE);
        let outside = Aabb::from_center_half_extents(Vec3::new(13.0, 0.0, 0.0), Vec3::ONE);
        assert!(frustum.intersects_aabb(&straddling));
        assert!(!frustum.intersects_aabb(&outside));
    }

    #[test]
    fn test_near_plane_normal_points_forward() {
        let frustum = camera_frustum();
        let near = frustum.planes[4];
        assert_relative_eq!(near.normal, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }
}
