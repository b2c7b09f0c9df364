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

// Penumbra Sandbox
// Renders the demo world on the headless device, resizes once midway and prints
// the averaged frame statistics as JSON.

mod demo;

use anyhow::{bail, Context, Result};
use clap::Parser;
use demo::DemoScene;
use penumbra_agents::{RenderAgent, RenderAgentConfig, ResizeEvent};
use penumbra_core::renderer::RendererSettings;
use penumbra_infra::HeadlessDevice;
use penumbra_telemetry::{init_logging, Stopwatch};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Renderer settings in RON. Missing fields keep their default.
    settings: Option<PathBuf>,
    /// Frames to render.
    #[arg(long, default_value_t = 240)]
    frames: u64,
    /// Initial output width.
    #[arg(long, default_value_t = 1280)]
    width: u32,
    /// Initial output height.
    #[arg(long, default_value_t = 720)]
    height: u32,
    /// Frame at which the output shrinks to half size. Zero keeps the size.
    #[arg(long, default_value_t = 120)]
    resize_at: u64,
    /// Cubes per grid edge.
    #[arg(long, default_value_t = 24)]
    grid: u32,
}

fn load_settings(path: Option<&PathBuf>) -> Result<RendererSettings> {
    let Some(path) = path else {
        return Ok(RendererSettings::default());
    };
    let source = fs::read_to_string(path)
        .with_context(|| format!("reading settings from {}", path.display()))?;
    RendererSettings::from_ron_str(&source)
        .with_context(|| format!("parsing settings from {}", path.display()))
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();
    let settings = load_settings(args.settings.as_ref())?;

    let device = Arc::new(HeadlessDevice::new(args.width, args.height));
    let mut demo = DemoScene::build(
        device.as_ref(),
        args.grid,
        args.width as f32 / args.height as f32,
    )?;
    let mut agent = RenderAgent::new(
        device.clone(),
        RenderAgentConfig {
            width: args.width,
            height: args.height,
            settings,
            ..Default::default()
        },
    )?;
    log::info!("Sandbox: passes {:?}", agent.pass_names());

    let resize = agent.resize_sender();
    let timer = Stopwatch::start();
    for frame in 0..args.frames {
        if args.resize_at > 0 && frame == args.resize_at {
            let (width, height) = ((args.width / 2).max(1), (args.height / 2).max(1));
            resize.send(ResizeEvent::new(width, height))?;
            demo.scene
                .camera_mut()
                .set_aspect_ratio(width as f32 / height as f32);
        }
        demo.animate(frame);
        agent.render_frame(&mut demo.scene, &demo.assets)?;
    }
    log::info!(
        "Sandbox: {} frames in {:.1}ms, final size {:?}",
        args.frames,
        timer.elapsed_ms(),
        agent.size()
    );
    println!("{}", agent.stats().average_json()?);

    for (_, drawable) in demo.scene.drawables_mut() {
        agent.release_drawable(drawable);
    }
    agent.shutdown();
    demo.destroy(device.as_ref());

    let violations = device.violations();
    for violation in &violations {
        log::error!("Sandbox: {violation}");
    }
    if !violations.is_empty() {
        bail!("{} resource-state violations", violations.len());
    }
    Ok(())
}
