use std::time::Instant;

use anyhow::Context;
use gu_display::render::{LineFlags, Plane, SceneFrame, Tile, Vector3};
use gu_display::tick::FrameClock;
use gu_display::{Client, DeviceConfig};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // Settings come from a JSON file when one is given, otherwise defaults are used.
    let config = match std::env::args().nth(1) {
        Some(path) => DeviceConfig::from_json_file(&path).with_context(|| format!("loading {path}"))?,
        None => DeviceConfig::default(),
    };

    let mut client = Client::new(config);
    let viewport = client.new_viewport(0, 0);
    client.open_window(viewport, 0, 0)?;

    let device = client
        .viewport(viewport)
        .and_then(|v| v.device())
        .map(|d| d.name())
        .unwrap_or("none");
    println!("Rendering with {device}");

    let mut clock = FrameClock::new(30.0);
    let mut t = 0.0f32;

    for _ in 0..90 {
        let frame_start = Instant::now();
        t += clock.tick().as_secs_f32();

        let result = client.tick(|device, vp| {
            let frame = SceneFrame::full(vp.width, vp.height);

            // A bar sweeping across the screen.
            let x = (t * 120.0) % vp.width as f32;
            let bar = Tile { x, y: 0.0, xl: 16.0, yl: vp.height as f32, color: Plane::new(1.0, 0.5, 0.0, 1.0), ..Default::default() };
            device.draw_tile(&frame, &bar)?;

            device.draw_2d_line(
                &frame,
                Plane::ONE,
                LineFlags::empty(),
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(vp.width as f32 - 1.0, vp.height as f32 - 1.0, 0.0),
            )?;
            Ok(())
        });

        if let Some(err) = result.error {
            log::error!("frame failed: {}", err);
        }

        if let Some(sleep) = clock.throttle(frame_start.elapsed()) {
            std::thread::sleep(sleep);
        }
    }

    if let Some(device) = client.viewport_mut(viewport).and_then(|v| v.device_mut()) {
        device.lock(&Default::default())?;
        println!("{}", device.stats()?);
        device.unlock(false)?;
    }

    client.shutdown();
    Ok(())
}
