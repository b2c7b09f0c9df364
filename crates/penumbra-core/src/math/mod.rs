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

//! Provides the linear algebra and bounding-volume primitives used by culling,
//! shadow setup and GPU record packing.
//!
//! Matrices are column-major and projections target a right-handed space with a
//! `[0, 1]` depth range. All angles are in **radians**.

// --- Fundamental Constants ---

/// A small constant for floating-point comparisons.
pub const EPSILON: f32 = 1e-5;

pub use std::f32::consts::{FRAC_PI_2, PI};

// --- Declare Sub-Modules ---

pub mod geometry;
pub mod matrix;
pub mod vector;

// --- Re-export Principal Types ---

pub use self::geometry::{Aabb, Frustum, Plane};
pub use self::matrix::Mat4;
pub use self::vector::{Vec2, Vec3, Vec4};

// --- Utility Functions ---

/// Clamps a value to a specified minimum and maximum range.
///
/// # Examples
///
/// ```
/// use penumbra_core::math::clamp;
/// assert_eq!(clamp(1.5, 0.0, 1.0), 1.0);
/// assert_eq!(clamp(-1.0, 0.0, 1.0), 0.0);
/// ```
#[inline]
pub fn clamp<T: PartialOrd>(value: T, min_val: T, max_val: T) -> T {
    if value < min_val {
        min_val
    } else if value > max_val {
        max_val
    } else {
        value
    }
}

/// Checks if two floating-point numbers are approximately equal using [`EPSILON`].
#[inline]
pub fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

/// Clamps `requested` into `[min, max]` and rounds the result to the *nearest* power of
/// two.
///
/// Ties round up. If rounding up would leave the range, the lower power of two is used
/// instead, so the result never exceeds `max` unless `max` itself is below the smallest
/// power of two that fits `min`. Likewise rounding down never drops below `min` while the
/// upper power of two still fits. A `min` of zero counts as one.
///
/// # Examples
///
/// ```
/// use penumbra_core::math::clamp_to_nearest_power_of_two;
/// assert_eq!(clamp_to_nearest_power_of_two(1000, 256, 8192), 1024);
/// assert_eq!(clamp_to_nearest_power_of_two(700, 256, 8192), 512);
/// assert_eq!(clamp_to_nearest_power_of_two(16, 256, 8192), 256);
/// ```
pub fn clamp_to_nearest_power_of_two(requested: u32, min: u32, max: u32) -> u32 {
    let clamped = clamp(requested, min.max(1), max.max(1));
    if clamped.is_power_of_two() {
        return clamped;
    }

    let upper = clamped.checked_next_power_of_two().unwrap_or(1 << 31);
    let lower = upper >> 1;

    let prefer_upper = upper - clamped <= clamped - lower || lower < min;
    if prefer_upper && upper <= max {
        upper
    } else {
        lower
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_power_of_two_rounds_both_ways() {
        assert_eq!(clamp_to_nearest_power_of_two(1000, 256, 8192), 1024);
        assert_eq!(clamp_to_nearest_power_of_two(700, 256, 8192), 512);
        assert_eq!(clamp_to_nearest_power_of_two(2048, 256, 8192), 2048);
    }

    #[test]
    fn test_nearest_power_of_two_tie_rounds_up() {
        // 768 sits exactly between 512 and 1024.
        assert_eq!(clamp_to_nearest_power_of_two(768, 256, 8192), 1024);
    }

    #[test]
    fn test_nearest_power_of_two_clamps_first() {
        assert_eq!(clamp_to_nearest_power_of_two(10, 64, 4096), 64);
        assert_eq!(clamp_to_nearest_power_of_two(100_000, 64, 4096), 4096);
    }

    #[test]
    fn test_nearest_power_of_two_never_exceeds_non_pow2_max() {
        // 3500 rounds up to 4096, which is above max.
        assert_eq!(clamp_to_nearest_power_of_two(3500, 64, 3600), 2048);
    }

    #[test]
    fn test_nearest_power_of_two_at_the_bottom_of_the_range() {
        assert_eq!(clamp_to_nearest_power_of_two(0, 256, 8192), 256);
        assert_eq!(clamp_to_nearest_power_of_two(256, 256, 8192), 256);
        assert_eq!(clamp_to_nearest_power_of_two(1, 1, 8192), 1);
        assert_eq!(clamp_to_nearest_power_of_two(0, 0, 8192), 1);
        assert_eq!(clamp_to_nearest_power_of_two(2, 0, 8192), 2);
        assert_eq!(clamp_to_nearest_power_of_two(3, 0, 8192), 4);
    }

    #[test]
    fn test_nearest_power_of_two_never_drops_below_non_pow2_min() {
        // 300 is nearer to 256, which is below min.
        assert_eq!(clamp_to_nearest_power_of_two(0, 300, 8192), 512);
        assert_eq!(clamp_to_nearest_power_of_two(300, 300, 8192), 512);
    }

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(5, 0, 3), 3);
        assert!(approx_eq(clamp(0.25, 0.0, 1.0), 0.25));
    }
}
