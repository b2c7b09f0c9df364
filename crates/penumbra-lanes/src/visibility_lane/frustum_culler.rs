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

//! Frustum culling for the camera and every light view.
//!
//! Culling is a linear scan over the scene's drawables. The scan is split into
//! contiguous partitions that run on the rayon pool; each partition fills private
//! lists and the lists are concatenated in partition order after the join, so the
//! result does not depend on the partition count.

use super::{CameraVisibility, PointLightVisibility, VisibilitySets};
use ahash::AHashSet;
use penumbra_core::math::{Aabb, Frustum, Vec3};
use penumbra_data::light::POINT_LIGHT_FACE_COUNT;
use penumbra_data::{AssetTable, Drawable, DrawableHandle, Material, PointLightHandle, Scene};
use rayon::prelude::*;

/// The face frustums of one point light.
type LightFrusta = (PointLightHandle, [Frustum; POINT_LIGHT_FACE_COUNT]);

/// Tests drawables against the camera and light frustums.
#[derive(Debug, Clone, Default)]
pub struct FrustumCuller {
    partitions: usize,
}

impl FrustumCuller {
    /// Creates a culler that splits the scan into `partitions` tasks. `0` uses the
    /// width of the rayon pool.
    pub fn new(partitions: usize) -> Self {
        Self { partitions }
    }

    /// Changes the partition count.
    pub fn set_partitions(&mut self, partitions: usize) {
        self.partitions = partitions;
    }

    /// The effective number of partitions.
    pub fn partitions(&self) -> usize {
        if self.partitions == 0 {
            rayon::current_num_threads().max(1)
        } else {
            self.partitions
        }
    }

    /// Computes every visibility set of the frame.
    ///
    /// # Arguments
    ///
    /// * `scene`: The drawables, lights and camera. Only read.
    /// * `materials`: Used to route drawables with forward-shaded materials.
    /// * `frustum_culling`: When `false`, every drawable is camera-visible.
    pub fn cull(
        &self,
        scene: &Scene,
        materials: &AssetTable<Material>,
        frustum_culling: bool,
    ) -> VisibilitySets {
        let drawables: Vec<(DrawableHandle, &Drawable)> = scene.drawables().collect();
        let lights: Vec<LightFrusta> = scene
            .point_lights()
            .map(|(handle, light)| {
                let faces = light.faces();
                (handle, std::array::from_fn(|face| faces[face].frustum))
            })
            .collect();

        let context = PartitionContext {
            camera_frustum: scene.camera().frustum(),
            camera_position: scene.camera().position,
            frustum_culling,
            lights: &lights,
            materials,
        };

        let chunk_size = drawables.len() / self.partitions() + 1;
        let partials: Vec<PartitionOutput> = drawables
            .par_chunks(chunk_size)
            .map(|chunk| context.cull_partition(chunk))
            .collect();

        // Join in partition order.
        let mut sets = VisibilitySets {
            point_lights: lights
                .iter()
                .map(|(handle, _)| PointLightVisibility::new(*handle))
                .collect(),
            ..Default::default()
        };
        let mut deferred: Vec<(DrawableHandle, f32)> = Vec::new();
        for partial in partials {
            sets.camera.forward.extend(partial.forward);
            deferred.extend(partial.deferred);
            sets.directional.extend(partial.directional);
            for (dst, src) in sets.point_lights.iter_mut().zip(partial.point_lights) {
                dst.append(src);
            }
        }

        // Stable: equal distances keep scan order.
        deferred.sort_by(|a, b| a.1.total_cmp(&b.1));
        sets.camera.deferred = deferred.into_iter().map(|(handle, _)| handle).collect();

        log::trace!(
            "FrustumCuller: {} deferred, {} forward, {} point lights",
            sets.camera.deferred.len(),
            sets.camera.forward.len(),
            sets.point_lights.len()
        );
        sets
    }
}

/// Writes this frame's camera visibility into the drawables' visibility flags.
pub fn apply_camera_visibility(scene: &mut Scene, camera: &CameraVisibility) {
    let visible: AHashSet<DrawableHandle> = camera
        .forward
        .iter()
        .chain(camera.deferred.iter())
        .copied()
        .collect();
    for (handle, drawable) in scene.drawables_mut() {
        drawable.set_visible(visible.contains(&handle));
    }
}

struct PartitionContext<'a> {
    camera_frustum: Frustum,
    camera_position: Vec3,
    frustum_culling: bool,
    lights: &'a [LightFrusta],
    materials: &'a AssetTable<Material>,
}

#[derive(Default)]
struct PartitionOutput {
    forward: Vec<DrawableHandle>,
    deferred: Vec<(DrawableHandle, f32)>,
    directional: Vec<DrawableHandle>,
    point_lights: Vec<PointLightVisibility>,
}

impl PartitionContext<'_> {
    fn cull_partition(&self, chunk: &[(DrawableHandle, &Drawable)]) -> PartitionOutput {
        let mut output = PartitionOutput {
            point_lights: self
                .lights
                .iter()
                .map(|(handle, _)| PointLightVisibility::new(*handle))
                .collect(),
            ..Default::default()
        };

        for &(handle, drawable) in chunk {
            let bounds = drawable.world_bounds();

            // 1. Camera
            if !self.frustum_culling || self.camera_frustum.intersects_aabb(bounds) {
                if self.is_forward(drawable) {
                    output.forward.push(handle);
                } else {
                    let distance = self.camera_position.distance_squared(bounds.center());
                    output.deferred.push((handle, distance));
                }
            }

            // 2. Point lights
            for ((_, faces), sets) in self.lights.iter().zip(output.point_lights.iter_mut()) {
                cull_point_light(handle, bounds, faces, sets);
            }

            // 3. Sun: cascade selection happens on the GPU.
            output.directional.push(handle);
        }

        output
    }

    fn is_forward(&self, drawable: &Drawable) -> bool {
        drawable.materials().iter().any(|&material| {
            self.materials
                .get(material)
                .is_some_and(Material::render_in_forward_pass)
        })
    }
}

fn cull_point_light(
    handle: DrawableHandle,
    bounds: &Aabb,
    faces: &[Frustum; POINT_LIGHT_FACE_COUNT],
    sets: &mut PointLightVisibility,
) {
    let mut in_group = [false; 2];
    for (face, frustum) in faces.iter().enumerate() {
        if frustum.intersects_aabb(bounds) {
            sets.per_face[face].push(handle);
            in_group[face / 3] = true;
        }
    }

    if in_group[0] || in_group[1] {
        sets.single_pass.push(handle);
    }
    for (group, visible) in in_group.into_iter().enumerate() {
        if visible {
            sets.two_pass[group].push(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestWorld;
    use penumbra_core::math::Mat4;
    use penumbra_data::PointLight;

    #[test]
    fn test_camera_culling_matches_plane_test() {
        let mut world = TestWorld::new();
        let material = world.material(Material::new("m"));
        for x in -6..=6 {
            for z in -6..=6 {
                world.spawn(Vec3::new(x as f32 * 4.0, 0.0, z as f32 * 4.0), material);
            }
        }

        let sets = FrustumCuller::new(1).cull(&world.scene, &world.assets.materials, true);
        let frustum = world.scene.camera().frustum();
        for (handle, drawable) in world.scene.drawables() {
            let expected = frustum.intersects_aabb(drawable.world_bounds());
            assert_eq!(sets.camera.deferred.contains(&handle), expected);
        }
        assert!(!sets.camera.deferred.is_empty());
        assert!(sets.camera.deferred.len() < world.scene.drawable_count());
    }

    #[test]
    fn test_camera_outside_point_light_inside() {
        let mut world = TestWorld::new();
        let material = world.material(Material::new("m"));
        // The camera at z = 10 looks down -Z; a box behind it is outside its frustum.
        let drawable = world.spawn(Vec3::new(0.0, 0.0, 14.0), material);
        world.scene.add_point_light(PointLight::new(
            Vec3::new(-3.0, 0.0, 14.0),
            Vec3::ONE,
            0.125,
        ));

        let sets = FrustumCuller::new(1).cull(&world.scene, &world.assets.materials, true);
        assert!(sets.camera.is_empty());

        let light = &sets.point_lights[0];
        assert_eq!(light.per_face[0], vec![drawable]);
        assert_eq!(light.single_pass, vec![drawable]);
        assert_eq!(light.two_pass[0], vec![drawable]);
        assert!(light.two_pass[1].is_empty());
        for face in 1..POINT_LIGHT_FACE_COUNT {
            assert!(light.per_face[face].is_empty(), "face {face} should be empty");
        }
    }

    #[test]
    fn test_point_light_partitions_are_consistent() {
        let mut world = TestWorld::new();
        let material = world.material(Material::new("m"));
        for i in 0..12 {
            let angle = i as f32 * 0.7;
            let y = (i as f32 - 6.0) * 0.8;
            world.spawn(Vec3::new(angle.cos() * 3.0, y, angle.sin() * 3.0), material);
        }
        world.scene.add_point_light(PointLight::new(Vec3::ZERO, Vec3::ONE, 0.125));

        let sets = FrustumCuller::new(1).cull(&world.scene, &world.assets.materials, true);
        let light = &sets.point_lights[0];
        for (handle, _) in world.scene.drawables() {
            let faces: Vec<usize> = (0..POINT_LIGHT_FACE_COUNT)
                .filter(|&f| light.per_face[f].contains(&handle))
                .collect();
            let group0 = faces.iter().any(|&f| f < 3);
            let group1 = faces.iter().any(|&f| f >= 3);
            assert_eq!(light.single_pass.contains(&handle), !faces.is_empty());
            assert_eq!(light.two_pass[0].contains(&handle), group0);
            assert_eq!(light.two_pass[1].contains(&handle), group1);
        }
        assert_eq!(light.single_pass.len(), world.scene.drawable_count());
    }

    #[test]
    fn test_forward_materials_are_routed_and_deferred_is_sorted() {
        let mut world = TestWorld::new();
        let opaque = world.material(Material::new("opaque"));
        let glass = world.material(Material::new("glass").with_forward_shading());

        let far = world.spawn(Vec3::new(0.0, 0.0, -20.0), opaque);
        let window = world.spawn(Vec3::new(1.0, 0.0, 0.0), glass);
        let near = world.spawn(Vec3::new(0.0, 0.0, 4.0), opaque);
        let middle = world.spawn(Vec3::new(0.0, 0.0, -5.0), opaque);

        let sets = FrustumCuller::new(1).cull(&world.scene, &world.assets.materials, true);
        assert_eq!(sets.camera.forward, vec![window]);
        assert_eq!(sets.camera.deferred, vec![near, middle, far]);
    }

    #[test]
    fn test_any_forward_material_routes_whole_drawable() {
        let mut world = TestWorld::new();
        let opaque = world.material(Material::new("opaque"));
        let glass = world.material(Material::new("glass").with_forward_shading());
        let mixed = world.spawn_multi(Vec3::ZERO, vec![opaque, glass]);

        let sets = FrustumCuller::new(1).cull(&world.scene, &world.assets.materials, true);
        assert_eq!(sets.camera.forward, vec![mixed]);
        assert!(sets.camera.deferred.is_empty());
    }

    #[test]
    fn test_partition_count_does_not_change_output() {
        let mut world = TestWorld::new();
        let opaque = world.material(Material::new("opaque"));
        let glass = world.material(Material::new("glass").with_forward_shading());
        for i in 0..97 {
            let material = if i % 7 == 0 { glass } else { opaque };
            let p = Vec3::new((i % 10) as f32 * 2.0 - 9.0, (i / 10) as f32 - 5.0, -(i % 13) as f32);
            world.spawn(p, material);
        }
        world.scene.add_point_light(PointLight::new(Vec3::new(0.0, 0.0, -3.0), Vec3::ONE, 0.5));
        world.scene.add_point_light(PointLight::new(Vec3::new(5.0, 2.0, 0.0), Vec3::ONE, 0.2));

        let sequential = FrustumCuller::new(1).cull(&world.scene, &world.assets.materials, true);
        for partitions in [2, 3, 8, 200] {
            let parallel =
                FrustumCuller::new(partitions).cull(&world.scene, &world.assets.materials, true);
            assert_eq!(parallel, sequential, "partitions = {partitions}");
        }
    }

    #[test]
    fn test_disabled_culling_sees_everything() {
        let mut world = TestWorld::new();
        let material = world.material(Material::new("m"));
        world.spawn(Vec3::new(0.0, 0.0, 50.0), material);
        world.spawn(Vec3::ZERO, material);

        let sets = FrustumCuller::new(1).cull(&world.scene, &world.assets.materials, false);
        assert_eq!(sets.camera.deferred.len(), 2);
        assert_eq!(sets.directional.len(), 2);
    }

    #[test]
    fn test_empty_scene() {
        let world = TestWorld::new();
        let sets = FrustumCuller::new(0).cull(&world.scene, &world.assets.materials, true);
        assert_eq!(sets, VisibilitySets::default());
    }

    #[test]
    fn test_apply_camera_visibility() {
        let mut world = TestWorld::new();
        let material = world.material(Material::new("m"));
        let seen = world.spawn(Vec3::ZERO, material);
        let hidden = world.spawn(Vec3::new(0.0, 0.0, 40.0), material);

        let sets = FrustumCuller::new(1).cull(&world.scene, &world.assets.materials, true);
        apply_camera_visibility(&mut world.scene, &sets.camera);
        assert!(world.scene.drawable(seen).is_some_and(|d| d.is_visible()));
        assert!(world.scene.drawable(hidden).is_some_and(|d| !d.is_visible()));

        world.scene.set_drawable_transform(seen, Mat4::from_translation(Vec3::new(0.0, 0.0, 40.0)));
        let sets = FrustumCuller::new(1).cull(&world.scene, &world.assets.materials, true);
        apply_camera_visibility(&mut world.scene, &sets.camera);
        let drawable = world.scene.drawable(seen).expect("live drawable");
        assert!(drawable.was_visible() && !drawable.is_visible());
    }
}
