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

//! Occlusion-query readback and issue planning.
//!
//! Results are read on the CPU at the start of a frame, before culling. The queries
//! themselves are recorded by the occlusion pass, which draws a box proxy of every
//! camera-visible deferred drawable against the depth buffer of the base pass.

use penumbra_core::math::{Aabb, Mat4, Vec3};
use penumbra_core::renderer::{GraphicsDevice, QueryId, QueryKind};
use penumbra_data::{Drawable, DrawableHandle, Scene};

/// Smallest proxy extent per axis, so flat objects still rasterize.
pub const MIN_PROXY_EXTENT: f32 = 0.005;

/// One proxy draw of the occlusion pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OcclusionQueryDraw {
    /// The tested drawable.
    pub drawable: DrawableHandle,
    /// The query bracketing the proxy.
    pub query: QueryId,
    /// Maps the unit cube `[-0.5, 0.5]^3` onto the drawable's world bounds.
    pub proxy_transform: Mat4,
}

/// The transform of the unit-cube proxy of `bounds`.
pub fn proxy_transform(bounds: &Aabb) -> Mat4 {
    let size = bounds.size().max(Vec3::splat(MIN_PROXY_EXTENT));
    Mat4::from_translation(bounds.center()) * Mat4::from_scale(size)
}

/// Folds last frames' query results into every drawable's occluded-frame counter.
///
/// When `enabled` is `false` every counter is forced to zero and pending results are
/// dropped. Returns the number of drawables currently occluded.
pub fn read_back_occlusion(scene: &mut Scene, device: &dyn GraphicsDevice, enabled: bool) -> usize {
    let mut occluded = 0;
    for (_, drawable) in scene.drawables_mut() {
        let state = drawable.occlusion_mut();
        if !enabled {
            state.suspend();
            continue;
        }

        state.advance();
        if let Some(query) = state.take_pending() {
            state.record_result(device.read_query_result(query));
        }
        if state.is_occluded() {
            occluded += 1;
        }
    }
    occluded
}

/// Picks the query of every drawable in `deferred` for this frame's slot, creating
/// query objects on first use.
///
/// Occluded drawables are included so that they are detected when they re-emerge.
/// A drawable whose query cannot be created is not tested this frame.
pub fn prepare_occlusion_queries(
    scene: &mut Scene,
    device: &dyn GraphicsDevice,
    deferred: &[DrawableHandle],
) -> Vec<OcclusionQueryDraw> {
    let mut draws = Vec::with_capacity(deferred.len());
    for &handle in deferred {
        let Some(drawable) = scene.drawable_mut(handle) else {
            continue;
        };
        let proxy = proxy_transform(drawable.world_bounds());

        let state = drawable.occlusion_mut();
        let query = match state.current_query() {
            Some(query) => query,
            None => match device.create_query(QueryKind::Occlusion) {
                Ok(query) => {
                    state.set_current_query(query);
                    query
                }
                Err(e) => {
                    log::warn!("OcclusionTracker: failed to create query for {handle:?}: {e}");
                    continue;
                }
            },
        };
        state.mark_issued();

        draws.push(OcclusionQueryDraw {
            drawable: handle,
            query,
            proxy_transform: proxy,
        });
    }
    draws
}

/// Destroys the query objects of a drawable that is leaving the scene.
pub fn release_occlusion_queries(drawable: &mut Drawable, device: &dyn GraphicsDevice) {
    for query in drawable.occlusion_mut().take_queries() {
        if let Err(e) = device.destroy_query(query) {
            log::warn!("OcclusionTracker: failed to destroy query {query:?}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestWorld;
    use approx::assert_relative_eq;
    use penumbra_core::math::Vec4;
    use penumbra_data::occlusion::OCCLUSION_QUERY_RING;
    use penumbra_data::Material;
    use penumbra_infra::HeadlessDevice;

    fn issue_and_submit(world: &mut TestWorld, device: &HeadlessDevice, handle: DrawableHandle) {
        let draws = prepare_occlusion_queries(&mut world.scene, device, &[handle]);
        let mut encoder = device.create_command_encoder(None);
        {
            let descriptor = penumbra_core::renderer::RenderPassDescriptor {
                label: None,
                color_attachments: &[],
                depth_attachment: None,
            };
            let mut pass = encoder.begin_render_pass(&descriptor);
            for draw in &draws {
                pass.begin_query(draw.query);
                pass.draw(0..36, 0..1);
                pass.end_query(draw.query);
            }
        }
        let command_buffer = encoder.finish();
        device.submit(command_buffer).expect("submit");
    }

    #[test]
    fn test_proxy_covers_bounds() {
        let bounds = Aabb::from_min_max(Vec3::new(1.0, 2.0, 3.0), Vec3::new(3.0, 2.0, 7.0));
        let proxy = proxy_transform(&bounds);
        let corner = proxy * Vec4::new(0.5, 0.5, 0.5, 1.0);
        assert_relative_eq!(corner.x, 3.0);
        assert_relative_eq!(corner.y, 2.0 + MIN_PROXY_EXTENT * 0.5);
        assert_relative_eq!(corner.z, 7.0);
    }

    #[test]
    fn test_occluded_after_more_than_ring_frames() {
        let device = HeadlessDevice::new(64, 64);
        device.set_default_query_result(Some(0));
        let mut world = TestWorld::new();
        let m = world.material(Material::new("m"));
        let handle = world.spawn(Vec3::ZERO, m);

        let mut occluded_frames = Vec::new();
        for _ in 0..(OCCLUSION_QUERY_RING * 3) {
            let occluded = read_back_occlusion(&mut world.scene, &device, true);
            occluded_frames.push(occluded);
            issue_and_submit(&mut world, &device, handle);
        }

        // Results lag by one ring, then need more than a ring of occluded frames.
        let first = occluded_frames
            .iter()
            .position(|&n| n == 1)
            .expect("drawable becomes occluded");
        assert_eq!(first, 2 * OCCLUSION_QUERY_RING);
    }

    #[test]
    fn test_visible_result_resets_counter() {
        let device = HeadlessDevice::new(64, 64);
        device.set_default_query_result(Some(0));
        let mut world = TestWorld::new();
        let m = world.material(Material::new("m"));
        let handle = world.spawn(Vec3::ZERO, m);

        for _ in 0..(OCCLUSION_QUERY_RING * 3) {
            read_back_occlusion(&mut world.scene, &device, true);
            issue_and_submit(&mut world, &device, handle);
        }
        assert!(world.scene.drawable(handle).is_some_and(|d| d.is_occluded()));

        device.set_default_query_result(Some(40));
        for _ in 0..OCCLUSION_QUERY_RING {
            issue_and_submit(&mut world, &device, handle);
            read_back_occlusion(&mut world.scene, &device, true);
        }
        let drawable = world.scene.drawable(handle).expect("live drawable");
        assert_eq!(drawable.occlusion().consecutive_occluded_frames(), 0);
    }

    #[test]
    fn test_disabled_forces_counters_to_zero() {
        let device = HeadlessDevice::new(64, 64);
        device.set_default_query_result(Some(0));
        let mut world = TestWorld::new();
        let m = world.material(Material::new("m"));
        let handle = world.spawn(Vec3::ZERO, m);

        for _ in 0..(OCCLUSION_QUERY_RING * 3) {
            read_back_occlusion(&mut world.scene, &device, true);
            issue_and_submit(&mut world, &device, handle);
        }
        assert_eq!(read_back_occlusion(&mut world.scene, &device, false), 0);
        assert!(world.scene.drawable(handle).is_some_and(|d| !d.is_occluded()));
    }

    #[test]
    fn test_queries_are_created_lazily_once_per_slot() {
        let device = HeadlessDevice::new(64, 64);
        let mut world = TestWorld::new();
        let m = world.material(Material::new("m"));
        let handle = world.spawn(Vec3::ZERO, m);

        for _ in 0..(OCCLUSION_QUERY_RING * 2) {
            read_back_occlusion(&mut world.scene, &device, true);
            prepare_occlusion_queries(&mut world.scene, &device, &[handle]);
        }
        assert_eq!(device.live_query_count(), OCCLUSION_QUERY_RING);

        let mut drawable = world.scene.remove_drawable(handle).expect("live drawable");
        release_occlusion_queries(&mut drawable, &device);
        assert_eq!(device.live_query_count(), 0);
    }

    #[test]
    fn test_release_continues_past_a_failed_destroy() {
        let device = HeadlessDevice::new(64, 64);
        let mut world = TestWorld::new();
        let m = world.material(Material::new("m"));
        let handle = world.spawn(Vec3::ZERO, m);

        let mut queries = Vec::new();
        for _ in 0..2 {
            read_back_occlusion(&mut world.scene, &device, true);
            let draws = prepare_occlusion_queries(&mut world.scene, &device, &[handle]);
            queries.extend(draws.iter().map(|draw| draw.query));
        }
        assert_eq!(device.live_query_count(), 2);
        device.destroy_query(queries[0]).expect("destroy");

        let mut drawable = world.scene.remove_drawable(handle).expect("live drawable");
        release_occlusion_queries(&mut drawable, &device);
        assert_eq!(device.live_query_count(), 0);
        assert_eq!(drawable.occlusion_mut().take_queries().count(), 0);
    }

    #[test]
    fn test_query_creation_failure_skips_drawable() {
        let device = HeadlessDevice::new(64, 64);
        device.set_query_creation_failure(true);
        let mut world = TestWorld::new();
        let m = world.material(Material::new("m"));
        let handle = world.spawn(Vec3::ZERO, m);

        let draws = prepare_occlusion_queries(&mut world.scene, &device, &[handle]);
        assert!(draws.is_empty());
    }
}
