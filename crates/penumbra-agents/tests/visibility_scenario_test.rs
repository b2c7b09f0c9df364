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

mod common;

use anyhow::Result;
use common::{agent, cube};
use penumbra_agents::RenderAgent;
use penumbra_core::math::{Mat4, Vec3, FRAC_PI_2};
use penumbra_core::renderer::{RenderError, RendererSettings};
use penumbra_data::occlusion::OCCLUSION_QUERY_RING;
use penumbra_data::{Camera, DrawableHandle, Material, PointLight, Scene, SceneAssets};
use penumbra_infra::HeadlessDevice;
use penumbra_telemetry::FrameStats;

struct LoneCube {
    scene: Scene,
    assets: SceneAssets,
    cube: DrawableHandle,
}

/// One 2 x 2 x 2 cube at the origin lit by a shadowed point light sitting inside it.
/// The camera starts at z = 10 looking down +z, away from both.
fn lone_cube() -> LoneCube {
    let camera = Camera::look_at(
        Vec3::new(0.0, 0.0, 10.0),
        Vec3::new(0.0, 0.0, 20.0),
        Vec3::Y,
        FRAC_PI_2,
        common::WIDTH as f32 / common::HEIGHT as f32,
        0.1,
        100.0,
    )
    .expect("valid camera");
    let mut scene = Scene::new(camera);
    let mut assets = SceneAssets::new();
    let mesh = assets.meshes.insert(cube());
    let stone = assets.materials.insert(Material::new("stone"));
    let cube = scene
        .add_drawable(
            &assets.meshes,
            mesh,
            vec![stone],
            Mat4::from_scale(Vec3::splat(2.0)),
        )
        .expect("valid drawable");
    scene.add_point_light(PointLight::new(Vec3::ZERO, Vec3::ONE, 5.0).with_shadows());
    LoneCube {
        scene,
        assets,
        cube,
    }
}

fn frame(agent: &mut RenderAgent, world: &mut LoneCube) -> Result<FrameStats> {
    Ok(agent.render_frame(&mut world.scene, &world.assets)?)
}

#[test]
fn test_light_sees_what_the_camera_misses() -> Result<()> {
    // --- 1. Setup ---
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    let mut world = lone_cube();
    let mut agent = agent(&device, RendererSettings::default())?;

    // --- 2. Camera looks away, the light still renders its shadow ---
    for _ in 0..2 {
        let stats = frame(&mut agent, &mut world)?;
        assert_eq!(stats.visible_deferred, 0);
        assert_eq!(stats.visible_forward, 0);
        assert_eq!(stats.queries, 0);
        assert_eq!(stats.shadow_point_lights, 1);
        assert!(stats.shadow_batches > 0);
    }
    let cube = world.scene.drawable(world.cube).expect("cube");
    assert!(!cube.is_visible());
    assert!(!cube.is_occluded());
    assert_eq!(device.violations(), Vec::new());
    Ok(())
}

#[test]
fn test_occlusion_follows_the_query_results() -> Result<()> {
    // --- 1. Setup: every query reports zero samples ---
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    device.set_default_query_result(Some(0));
    let mut world = lone_cube();
    let mut agent = agent(&device, RendererSettings::default())?;

    // --- 2. Turn the camera towards the cube ---
    assert!(world
        .scene
        .camera_mut()
        .set_look_at(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y));

    // Results lag the ring, and a drawable only counts as occluded once more
    // results than the ring holds have come back empty.
    let frames_until_occluded = 2 * OCCLUSION_QUERY_RING + 1;
    for index in 0..frames_until_occluded {
        let stats = frame(&mut agent, &mut world)?;
        assert_eq!(stats.visible_deferred, 1, "frame {index}");
        assert_eq!(stats.queries, 1, "frame {index}");
        let expected = u32::from(index + 1 == frames_until_occluded);
        assert_eq!(stats.occluded, expected, "frame {index}");
    }
    assert!(world.scene.drawable(world.cube).expect("cube").is_occluded());

    // Still occluded on the next frame; the drawable keeps being tested.
    let stats = frame(&mut agent, &mut world)?;
    assert_eq!(stats.occluded, 1);
    assert_eq!(stats.queries, 1);

    // --- 3. The cube re-emerges ---
    device.set_default_query_result(Some(1));
    for _ in 0..2 {
        let stats = frame(&mut agent, &mut world)?;
        assert_eq!(stats.occluded, 0);
        assert_eq!(stats.visible_deferred, 1);
    }
    assert!(!world.scene.drawable(world.cube).expect("cube").is_occluded());
    assert_eq!(device.violations(), Vec::new());
    Ok(())
}

#[test]
fn test_lost_device_surfaces_unchanged() -> Result<()> {
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    let mut world = lone_cube();
    let mut agent = agent(&device, RendererSettings::default())?;
    frame(&mut agent, &mut world)?;

    device.lose_device();
    // The first frame fails waiting on the previous fence, later ones on submit.
    for _ in 0..2 {
        let result = agent.render_frame(&mut world.scene, &world.assets);
        assert!(
            matches!(result, Err(RenderError::DeviceLost)),
            "{result:?}"
        );
    }
    Ok(())
}

#[test]
fn test_exhausted_memory_fails_initialization() {
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    device.set_memory_budget(Some(64 * 1024));

    match agent(&device, RendererSettings::default()) {
        Err(RenderError::InitializationFailed(message)) => {
            assert!(message.contains("Out of GPU memory"), "{message}");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("initialization should fail"),
    }
    assert_eq!(device.allocated_bytes(), 0);
}
