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
use common::{agent, lit_grid, World};
use penumbra_agents::RenderAgent;
use penumbra_core::renderer::{
    DebugView, PointLightShadowMode, RenderError, RendererSettings,
};
use penumbra_infra::HeadlessDevice;

fn render(agent: &mut RenderAgent, world: &mut World, frames: usize) -> Result<()> {
    for _ in 0..frames {
        agent.render_frame(&mut world.scene, &world.assets)?;
    }
    Ok(())
}

/// Every frame resource must be at its home state on the device, not just in the
/// agent's bookkeeping.
fn assert_device_at_home(device: &HeadlessDevice, agent: &RenderAgent, case: &str) {
    let resources = agent.frame_resources();
    for resource in resources.live() {
        let actual = match resources.texture(resource) {
            Ok(id) => device.texture_state(id),
            Err(_) => resources.buffer(resource).ok().and_then(|id| device.buffer_state(id)),
        };
        assert_eq!(
            actual,
            Some(resource.home_state()),
            "{case}: {resource:?} left away from home"
        );
    }
    assert!(agent.resource_states().verify_home().is_ok(), "{case}");
}

#[test]
fn test_frames_follow_the_state_protocol() -> Result<()> {
    // --- 1. Setup ---
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    let mut world = lit_grid();
    let mut agent = agent(&device, RendererSettings::default())?;

    // --- 2. Render a few frames ---
    for frame in 0..4u64 {
        let stats = agent.render_frame(&mut world.scene, &world.assets)?;
        assert_eq!(stats.frame_index, frame);
        assert!(stats.draw_calls > 0);
        assert!(stats.dispatches > 0);
        assert!(stats.visible_deferred > 0);
        assert!(stats.visible_forward > 0);
        assert_eq!(stats.shadow_point_lights, 2);
        assert_eq!(stats.point_lights, 1);
    }

    // --- 3. Verify ---
    assert_eq!(device.violations(), Vec::new());
    assert_eq!(device.present_count(), 4);
    assert_eq!(agent.frame_index(), 4);
    assert_eq!(agent.stats().len(), 4);
    assert_device_at_home(&device, &agent, "default settings");

    let submission = device.last_submission().expect("a submitted frame");
    let groups = submission.debug_groups();
    assert_eq!(groups.first().map(String::as_str), Some("LightBuffers"));
    assert_eq!(groups.last().map(String::as_str), Some("Present"));
    Ok(())
}

#[test]
fn test_every_toggle_returns_resources_home() -> Result<()> {
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    let mut world = lit_grid();
    let mut agent = agent(&device, RendererSettings::default())?;

    let cases: Vec<(&str, fn(&mut RendererSettings))> = vec![
        ("defaults", |_| {}),
        ("no ssao", |s| s.ssao = false),
        ("no fxaa", |s| s.fxaa = false),
        ("fxaa debug", |s| s.fxaa_debug = true),
        ("no temporal aa", |s| s.temporal_aa = false),
        ("vrs", |s| s.vrs = true),
        ("no pre-pass", |s| s.pre_pass = false),
        ("no base pass", |s| s.base_pass = false),
        ("no shadows", |s| s.shadows = false),
        ("no shadow mask", |s| s.shadow_mask = false),
        ("no point light shadows", |s| s.point_light_shadows = false),
        ("no sun shadows", |s| s.sun_shadows = false),
        ("cpu cascades", |s| s.gpu_cascades = false),
        ("no depth reduction", |s| s.depth_reduction = false),
        ("no skybox", |s| s.skybox = false),
        ("no frustum culling", |s| s.frustum_culling = false),
        ("no occlusion culling", |s| s.occlusion_culling = false),
        ("light and bounds overlays", |s| {
            s.draw_point_lights = true;
            s.draw_aabbs = true;
        }),
        ("two-pass point shadows", |s| {
            s.point_light_shadow_mode = PointLightShadowMode::TwoPass
        }),
        ("multi-pass point shadows", |s| {
            s.point_light_shadow_mode = PointLightShadowMode::MultiPass
        }),
        ("tile heatmap", |s| s.debug_view = DebugView::TileHeatmap),
        ("cascade overlay", |s| s.debug_view = DebugView::CascadeOverlay),
        ("one shadowed point light", |s| s.max_point_light_shadows = 1),
        ("two cascades", |s| s.cascade_count = 2),
        ("small shadow maps", |s| {
            s.cascade_size = 512;
            s.point_light_shadow_size = 128;
        }),
        ("single culling partition", |s| s.culling_threads = 1),
        ("everything off", |s| {
            s.ssao = false;
            s.fxaa = false;
            s.temporal_aa = false;
            s.pre_pass = false;
            s.shadows = false;
            s.depth_reduction = false;
            s.skybox = false;
            s.occlusion_culling = false;
        }),
        ("everything on", |s| {
            s.fxaa_debug = true;
            s.vrs = true;
            s.draw_point_lights = true;
            s.draw_aabbs = true;
        }),
    ];

    for (case, apply) in cases {
        let mut settings = RendererSettings::default();
        apply(&mut settings);
        agent.set_settings(settings);
        render(&mut agent, &mut world, 2)?;

        assert_eq!(device.take_violations(), Vec::new(), "{case}");
        assert_device_at_home(&device, &agent, case);
    }
    Ok(())
}

#[test]
fn test_shadow_budget_demotes_casters() -> Result<()> {
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    let mut world = lit_grid();
    let settings = RendererSettings {
        max_point_light_shadows: 1,
        ..Default::default()
    };
    let mut agent = agent(&device, settings)?;

    let stats = agent.render_frame(&mut world.scene, &world.assets)?;
    assert_eq!(stats.shadow_point_lights, 1);
    assert_eq!(stats.point_lights, 2);
    Ok(())
}

#[test]
fn test_shadow_map_changes_do_not_leak() -> Result<()> {
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    let mut world = lit_grid();
    let mut agent = agent(&device, RendererSettings::default())?;
    render(&mut agent, &mut world, 1)?;
    let textures = device.live_texture_count();

    agent.settings_mut().cascade_size = 1024;
    agent.settings_mut().point_light_shadow_size = 256;
    render(&mut agent, &mut world, 1)?;

    assert_eq!(device.live_texture_count(), textures);
    assert_eq!(device.take_violations(), Vec::new());
    assert_device_at_home(&device, &agent, "resized shadow maps");
    Ok(())
}

#[test]
fn test_initialization_failure_names_the_pass() {
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    device.fail_pipelines_matching("TiledLighting");

    match agent(&device, RendererSettings::default()) {
        Err(RenderError::InitializationFailed(message)) => {
            assert!(message.contains("TiledLighting"), "{message}");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("initialization should fail"),
    }

    // Nothing created before the failure survives it.
    assert_eq!(device.live_texture_count(), 0);
    assert_eq!(device.live_buffer_count(), 0);
    assert_eq!(device.live_pipeline_count(), 0);
}

#[test]
fn test_occluded_drawables_skip_the_geometry_passes() -> Result<()> {
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    device.set_default_query_result(Some(0));
    let mut world = lit_grid();
    let mut agent = agent(&device, RendererSettings::default())?;

    let first = agent.render_frame(&mut world.scene, &world.assets)?;
    assert_eq!(first.occluded, 0);
    assert!(first.queries > 0);

    render(&mut agent, &mut world, 8)?;
    let latest = *agent.stats().latest().expect("rendered frames");
    assert!(latest.occluded > 0);
    assert!(latest.draw_calls < first.draw_calls);
    assert_eq!(device.violations(), Vec::new());
    Ok(())
}

#[test]
fn test_shutdown_releases_everything() -> Result<()> {
    let device = HeadlessDevice::new(common::WIDTH, common::HEIGHT);
    let mut world = lit_grid();
    let mut agent = agent(&device, RendererSettings::default())?;
    render(&mut agent, &mut world, 3)?;
    assert!(device.live_query_count() > 0);

    for (_, drawable) in world.scene.drawables_mut() {
        agent.release_drawable(drawable);
    }
    agent.shutdown();

    assert_eq!(device.live_texture_count(), 0);
    assert_eq!(device.live_buffer_count(), 0);
    assert_eq!(device.live_pipeline_count(), 0);
    assert_eq!(device.live_query_count(), 0);

    // Shutting down twice, or dropping afterwards, is harmless.
    agent.shutdown();
    drop(agent);
    Ok(())
}
