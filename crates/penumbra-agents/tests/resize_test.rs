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
use common::{agent, lit_grid, HEIGHT, WIDTH};
use penumbra_agents::ResizeEvent;
use penumbra_core::renderer::RendererSettings;
use penumbra_infra::HeadlessDevice;
use std::thread;

#[test]
fn test_pending_resizes_coalesce() -> Result<()> {
    let device = HeadlessDevice::new(WIDTH, HEIGHT);
    let mut world = lit_grid();
    let mut agent = agent(&device, RendererSettings::default())?;
    agent.render_frame(&mut world.scene, &world.assets)?;
    let textures = device.live_texture_count();

    // Events may come from the windowing thread.
    let sender = agent.resize_sender();
    thread::spawn(move || {
        sender.send(ResizeEvent::new(640, 360)).unwrap();
        sender.send(ResizeEvent::new(0, 0)).unwrap();
        sender.send(ResizeEvent::new(800, 450)).unwrap();
    })
    .join()
    .unwrap();

    let stats = agent.render_frame(&mut world.scene, &world.assets)?;
    assert_eq!(agent.size(), (800, 450));
    assert_eq!(device.swapchain_size(), (800, 450));
    assert!(stats.draw_calls > 0);
    assert_eq!(device.live_texture_count(), textures);
    assert_eq!(device.violations(), Vec::new());
    assert!(agent.resource_states().verify_home().is_ok());
    Ok(())
}

#[test]
fn test_minimised_window_keeps_size() -> Result<()> {
    let device = HeadlessDevice::new(WIDTH, HEIGHT);
    let mut world = lit_grid();
    let mut agent = agent(&device, RendererSettings::default())?;

    agent.resize_sender().send(ResizeEvent::new(0, 0)).unwrap();
    agent.resize_sender().send(ResizeEvent::new(WIDTH, HEIGHT)).unwrap();
    agent.render_frame(&mut world.scene, &world.assets)?;

    assert_eq!(agent.size(), (WIDTH, HEIGHT));
    assert_eq!(device.violations(), Vec::new());
    Ok(())
}

#[test]
fn test_failed_resize_keeps_previous_targets() -> Result<()> {
    let device = HeadlessDevice::new(WIDTH, HEIGHT);
    device.set_max_texture_dimension(1024);
    let mut world = lit_grid();
    let mut agent = agent(&device, RendererSettings {
        cascade_size: 1024,
        ..Default::default()
    })?;
    agent.render_frame(&mut world.scene, &world.assets)?;
    let textures = device.live_texture_count();

    agent.resize_sender().send(ResizeEvent::new(2048, 600)).unwrap();
    let stats = agent.render_frame(&mut world.scene, &world.assets)?;

    assert_eq!(agent.size(), (WIDTH, HEIGHT));
    assert_eq!(device.swapchain_size(), (WIDTH, HEIGHT));
    assert_eq!(device.live_texture_count(), textures);
    assert!(stats.draw_calls > 0);
    assert_eq!(device.violations(), Vec::new());

    // A later valid size still applies.
    agent.resize_sender().send(ResizeEvent::new(640, 360)).unwrap();
    agent.render_frame(&mut world.scene, &world.assets)?;
    assert_eq!(agent.size(), (640, 360));
    Ok(())
}

#[test]
fn test_direct_resize_reports_failure() -> Result<()> {
    let device = HeadlessDevice::new(WIDTH, HEIGHT);
    device.set_max_texture_dimension(1024);
    let mut agent = agent(&device, RendererSettings {
        cascade_size: 1024,
        ..Default::default()
    })?;

    assert!(agent.resize(4096, 4096).is_err());
    assert_eq!(agent.size(), (WIDTH, HEIGHT));
    agent.resize(512, 288)?;
    assert_eq!(agent.size(), (512, 288));
    Ok(())
}
