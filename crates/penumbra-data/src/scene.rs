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

//! The drawable registry.

use crate::arena::{Arena, Handle};
use crate::assets::{AssetHandle, AssetTable};
use crate::camera::Camera;
use crate::error::SceneError;
use crate::light::{DirectionalLight, PointLight};
use crate::material::Material;
use crate::mesh::Mesh;
use crate::occlusion::OcclusionState;
use penumbra_core::math::{Aabb, Mat4};

/// Handle to a [`Drawable`] in a [`Scene`].
pub type DrawableHandle = Handle<Drawable>;
/// Handle to a [`PointLight`] in a [`Scene`].
pub type PointLightHandle = Handle<PointLight>;

/// A mesh instance placed in the world.
#[derive(Clone)]
pub struct Drawable {
    mesh: AssetHandle<Mesh>,
    materials: Vec<AssetHandle<Material>>,
    transform: Mat4,
    local_bounds: Aabb,
    world_bounds: Aabb,
    was_visible: bool,
    is_visible: bool,
    occlusion: OcclusionState,
}

impl Drawable {
    /// The mesh drawn.
    pub fn mesh(&self) -> AssetHandle<Mesh> {
        self.mesh
    }

    /// One material per sub-mesh, in sub-mesh order.
    pub fn materials(&self) -> &[AssetHandle<Material>] {
        &self.materials
    }

    /// Object to world transform.
    pub fn transform(&self) -> &Mat4 {
        &self.transform
    }

    /// Object-space bounds, copied from the mesh.
    pub fn local_bounds(&self) -> &Aabb {
        &self.local_bounds
    }

    /// World-space bounds of the mesh under the current transform.
    pub fn world_bounds(&self) -> &Aabb {
        &self.world_bounds
    }

    /// Whether the drawable was camera-visible in the previous frame.
    pub fn was_visible(&self) -> bool {
        self.was_visible
    }

    /// Whether the drawable is camera-visible this frame.
    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    /// Records this frame's camera visibility, keeping the previous value.
    pub fn set_visible(&mut self, visible: bool) {
        self.was_visible = self.is_visible;
        self.is_visible = visible;
    }

    /// The occlusion-query state.
    pub fn occlusion(&self) -> &OcclusionState {
        &self.occlusion
    }

    /// The occlusion-query state, mutably.
    pub fn occlusion_mut(&mut self) -> &mut OcclusionState {
        &mut self.occlusion
    }

    /// Shorthand for `occlusion().is_occluded()`.
    pub fn is_occluded(&self) -> bool {
        self.occlusion.is_occluded()
    }

    fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
        self.world_bounds = self.local_bounds.transform(&transform);
    }
}

/// All renderable state for one frame: drawables, lights and the camera.
#[derive(Debug, Default)]
pub struct Scene {
    drawables: Arena<Drawable>,
    point_lights: Arena<PointLight>,
    directional_light: Option<DirectionalLight>,
    camera: Camera,
}

impl std::fmt::Debug for Drawable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drawable")
            .field("mesh", &self.mesh)
            .field("materials", &self.materials.len())
            .field("is_visible", &self.is_visible)
            .finish()
    }
}

impl Scene {
    /// Creates an empty scene viewed through `camera`.
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            ..Default::default()
        }
    }

    /// The active camera.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// The active camera, mutably.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Spawns a drawable.
    ///
    /// # Errors
    ///
    /// [`SceneError::UnknownMesh`] if `mesh` does not resolve in `meshes`, and
    /// [`SceneError::MaterialCountMismatch`] if `materials` does not hold exactly one
    /// entry per sub-mesh.
    pub fn add_drawable(
        &mut self,
        meshes: &AssetTable<Mesh>,
        mesh: AssetHandle<Mesh>,
        materials: Vec<AssetHandle<Material>>,
        transform: Mat4,
    ) -> Result<DrawableHandle, SceneError> {
        let Some(mesh_data) = meshes.get(mesh) else {
            log::warn!("Scene: rejected drawable with unknown mesh {}", mesh.id());
            return Err(SceneError::UnknownMesh(mesh.id()));
        };
        if mesh_data.sub_mesh_count() != materials.len() {
            let error = SceneError::MaterialCountMismatch {
                mesh: mesh_data.label.clone(),
                expected: mesh_data.sub_mesh_count(),
                actual: materials.len(),
            };
            log::warn!("Scene: rejected drawable: {error}");
            return Err(error);
        }

        let local_bounds = mesh_data.bounds;
        let drawable = Drawable {
            mesh,
            materials,
            transform,
            local_bounds,
            world_bounds: local_bounds.transform(&transform),
            was_visible: false,
            is_visible: false,
            occlusion: OcclusionState::default(),
        };
        let handle = self.drawables.insert(drawable);
        log::debug!("Scene: added drawable {handle:?} with mesh '{}'", mesh_data.label);
        Ok(handle)
    }

    /// Removes a drawable and returns it, so its query objects can be released.
    pub fn remove_drawable(&mut self, handle: DrawableHandle) -> Option<Drawable> {
        let removed = self.drawables.remove(handle);
        match &removed {
            Some(_) => log::debug!("Scene: removed drawable {handle:?}"),
            None => log::warn!("Scene: remove_drawable called with stale handle {handle:?}"),
        }
        removed
    }

    /// Moves a drawable. Returns `false` for a stale handle.
    pub fn set_drawable_transform(&mut self, handle: DrawableHandle, transform: Mat4) -> bool {
        match self.drawables.get_mut(handle) {
            Some(drawable) => {
                drawable.set_transform(transform);
                true
            }
            None => false,
        }
    }

    /// Looks up a drawable.
    pub fn drawable(&self, handle: DrawableHandle) -> Option<&Drawable> {
        self.drawables.get(handle)
    }

    /// Looks up a drawable mutably.
    pub fn drawable_mut(&mut self, handle: DrawableHandle) -> Option<&mut Drawable> {
        self.drawables.get_mut(handle)
    }

    /// All drawables in slot order.
    pub fn drawables(&self) -> impl Iterator<Item = (DrawableHandle, &Drawable)> + '_ {
        self.drawables.iter()
    }

    /// All drawables in slot order, mutably.
    pub fn drawables_mut(&mut self) -> impl Iterator<Item = (DrawableHandle, &mut Drawable)> + '_ {
        self.drawables.iter_mut()
    }

    /// Number of drawables.
    pub fn drawable_count(&self) -> usize {
        self.drawables.len()
    }

    /// Adds a point light.
    pub fn add_point_light(&mut self, light: PointLight) -> PointLightHandle {
        let handle = self.point_lights.insert(light);
        log::debug!("Scene: added point light {handle:?}");
        handle
    }

    /// Removes a point light.
    pub fn remove_point_light(&mut self, handle: PointLightHandle) -> Option<PointLight> {
        let removed = self.point_lights.remove(handle);
        if removed.is_some() {
            log::debug!("Scene: removed point light {handle:?}");
        }
        removed
    }

    /// Looks up a point light.
    pub fn point_light(&self, handle: PointLightHandle) -> Option<&PointLight> {
        self.point_lights.get(handle)
    }

    /// Looks up a point light mutably.
    pub fn point_light_mut(&mut self, handle: PointLightHandle) -> Option<&mut PointLight> {
        self.point_lights.get_mut(handle)
    }

    /// All point lights in slot order.
    pub fn point_lights(&self) -> impl Iterator<Item = (PointLightHandle, &PointLight)> + '_ {
        self.point_lights.iter()
    }

    /// Number of point lights.
    pub fn point_light_count(&self) -> usize {
        self.point_lights.len()
    }

    /// Replaces (or removes) the sun.
    pub fn set_directional_light(&mut self, light: Option<DirectionalLight>) {
        let change = if light.is_some() { "set" } else { "cleared" };
        log::debug!("Scene: directional light {change}");
        self.directional_light = light;
    }

    /// The sun, if any.
    pub fn directional_light(&self) -> Option<&DirectionalLight> {
        self.directional_light.as_ref()
    }

    /// Removes every drawable and light and returns the drawables, so their query
    /// objects can be released.
    pub fn clear(&mut self) -> Vec<Drawable> {
        let handles: Vec<_> = self.drawables.iter().map(|(h, _)| h).collect();
        let removed = handles
            .into_iter()
            .filter_map(|h| self.drawables.remove(h))
            .collect();
        self.point_lights.clear();
        self.directional_light = None;
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::SceneAssets;
    use crate::mesh::{SubMesh, VertexBuffers};
    use approx::assert_relative_eq;
    use penumbra_core::math::Vec3;
    use penumbra_core::renderer::{BufferId, IndexFormat};

    fn cube_mesh(sub_meshes: usize) -> Mesh {
        Mesh {
            label: "cube".to_string(),
            vertex_buffers: VertexBuffers::positions_only(BufferId(0)),
            index_buffer: BufferId(1),
            index_format: IndexFormat::Uint16,
            bounds: Aabb::from_min_max(Vec3::splat(-1.0), Vec3::ONE),
            sub_meshes: vec![
                SubMesh {
                    base_vertex: 0,
                    start_index: 0,
                    index_count: 36,
                    vertex_count: 24,
                };
                sub_meshes
            ],
        }
    }

    #[test]
    fn test_add_drawable_computes_world_bounds() {
        let mut assets = SceneAssets::new();
        let mesh = assets.meshes.insert(cube_mesh(1));
        let material = assets.materials.insert(Material::new("m"));
        let mut scene = Scene::default();

        let handle = scene
            .add_drawable(
                &assets.meshes,
                mesh,
                vec![material],
                Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)),
            )
            .expect("valid drawable");
        let drawable = scene.drawable(handle).expect("live drawable");
        assert_relative_eq!(drawable.world_bounds().min, Vec3::new(4.0, -1.0, -1.0));

        scene.set_drawable_transform(handle, Mat4::IDENTITY);
        let drawable = scene.drawable(handle).expect("live drawable");
        assert_relative_eq!(drawable.world_bounds().center(), Vec3::ZERO);
    }

    #[test]
    fn test_material_count_must_match_sub_meshes() {
        let mut assets = SceneAssets::new();
        let mesh = assets.meshes.insert(cube_mesh(2));
        let material = assets.materials.insert(Material::new("m"));
        let mut scene = Scene::default();

        let err = scene
            .add_drawable(&assets.meshes, mesh, vec![material], Mat4::IDENTITY)
            .unwrap_err();
        assert_eq!(
            err,
            SceneError::MaterialCountMismatch {
                mesh: "cube".to_string(),
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_unknown_mesh_is_rejected() {
        let assets = SceneAssets::new();
        let mut scene = Scene::default();
        let err = scene
            .add_drawable(&assets.meshes, AssetHandle::from_raw(9), vec![], Mat4::IDENTITY)
            .unwrap_err();
        assert_eq!(err, SceneError::UnknownMesh(9));
    }

    #[test]
    fn test_rejected_and_stale_edits_leave_the_scene_alone() {
        let mut assets = SceneAssets::new();
        let mesh = assets.meshes.insert(cube_mesh(1));
        let material = assets.materials.insert(Material::new("m"));
        let mut scene = Scene::default();
        let kept = scene
            .add_drawable(&assets.meshes, mesh, vec![material], Mat4::IDENTITY)
            .expect("valid drawable");
        let gone = scene
            .add_drawable(&assets.meshes, mesh, vec![material], Mat4::IDENTITY)
            .expect("valid drawable");
        assert!(scene.remove_drawable(gone).is_some());

        assert!(scene
            .add_drawable(&assets.meshes, mesh, vec![], Mat4::IDENTITY)
            .is_err());
        assert!(scene.remove_drawable(gone).is_none());
        assert_eq!(scene.drawable_count(), 1);
        assert!(scene.drawable(kept).is_some());

        let light = scene.add_point_light(PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0));
        assert!(scene.remove_point_light(light).is_some());
        assert!(scene.remove_point_light(light).is_none());
        assert_eq!(scene.point_light_count(), 0);
    }

    #[test]
    fn test_visibility_flags_shift() {
        let mut assets = SceneAssets::new();
        let mesh = assets.meshes.insert(cube_mesh(1));
        let material = assets.materials.insert(Material::new("m"));
        let mut scene = Scene::default();
        let handle = scene
            .add_drawable(&assets.meshes, mesh, vec![material], Mat4::IDENTITY)
            .expect("valid drawable");

        let drawable = scene.drawable_mut(handle).expect("live drawable");
        drawable.set_visible(true);
        drawable.set_visible(false);
        assert!(drawable.was_visible());
        assert!(!drawable.is_visible());
    }

    #[test]
    fn test_clear_returns_drawables() {
        let mut assets = SceneAssets::new();
        let mesh = assets.meshes.insert(cube_mesh(1));
        let material = assets.materials.insert(Material::new("m"));
        let mut scene = Scene::default();
        for _ in 0..3 {
            scene
                .add_drawable(&assets.meshes, mesh, vec![material], Mat4::IDENTITY)
                .expect("valid drawable");
        }
        scene.add_point_light(PointLight::new(Vec3::ZERO, Vec3::ONE, 1.0));

        assert_eq!(scene.clear().len(), 3);
        assert_eq!(scene.drawable_count(), 0);
        assert_eq!(scene.point_light_count(), 0);
    }
}
