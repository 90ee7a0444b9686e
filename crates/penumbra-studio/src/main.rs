mod clock;
mod scene;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use penumbra_compute::device::{HeadlessDevice, HeadlessInit, WgpuDevice, WgpuInit};
use penumbra_compute::logging::{init_logging, LoggingConfig};
use penumbra_compute::{CommandQueue, GpuDevice};
use penumbra_raytrace::kernels::{kernel_libraries, KERNEL_NAMES};
use penumbra_raytrace::{RayTracingRenderer, RendererConfig, SceneMask};

use crate::clock::FrameClock;
use crate::scene::DemoScene;

const USAGE: &str = "usage: penumbra-studio [--frames N] [--size WxH] [--headless] [--log FILTER]";

#[derive(Debug, Clone, PartialEq)]
struct Args {
    frames: u32,
    resolution: [u32; 2],
    headless: bool,
    log_filter: Option<String>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            frames: 16,
            resolution: [640, 480],
            headless: false,
            log_filter: None,
        }
    }
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = Self::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--frames" => {
                    let value = args.next().context("--frames needs a value")?;
                    parsed.frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count `{value}`"))?;
                }
                "--size" => {
                    let value = args.next().context("--size needs a value")?;
                    parsed.resolution = parse_size(&value)?;
                }
                "--headless" => parsed.headless = true,
                "--log" => parsed.log_filter = Some(args.next().context("--log needs a value")?),
                other => bail!("unexpected argument `{other}`\n{USAGE}"),
            }
        }
        Ok(parsed)
    }
}

fn parse_size(value: &str) -> Result<[u32; 2]> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .with_context(|| format!("size `{value}` is not WxH"))?;
    let w: u32 = w.parse().with_context(|| format!("invalid width in `{value}`"))?;
    let h: u32 = h.parse().with_context(|| format!("invalid height in `{value}`"))?;
    if w == 0 || h == 0 {
        bail!("size `{value}` must be non-zero");
    }
    Ok([w, h])
}

fn main() -> Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    init_logging(LoggingConfig {
        env_filter: args.log_filter.clone(),
        ..LoggingConfig::default()
    });

    if !args.headless {
        match pollster::block_on(WgpuDevice::request(WgpuInit::default())) {
            Ok(device) => {
                let device = device.with_libraries(kernel_libraries());
                return run(Arc::new(device), &args);
            }
            Err(err) => log::warn!("no usable GPU ({err:#}); falling back to the headless device"),
        }
    }

    let device = HeadlessDevice::new(HeadlessInit::with_kernels(KERNEL_NAMES));
    run(Arc::new(device), &args)
}

fn run<D: GpuDevice>(device: Arc<D>, args: &Args) -> Result<()> {
    let queue = CommandQueue::new(device, "studio");
    let config = RendererConfig {
        resolution: args.resolution,
        ..RendererConfig::default()
    };
    let mut renderer = RayTracingRenderer::with_config(&queue, config)
        .with_context(|| format!("renderer setup on `{}` failed", queue.device().label()))?;

    let mut clock = FrameClock::new();
    let scene = DemoScene::new();
    let aspect = args.resolution[0] as f32 / args.resolution[1] as f32;
    renderer.set_scene_bounds(scene.bounds);
    renderer.set_scene_geometry(scene.geometry);
    renderer.set_view(DemoScene::view(0.6, aspect));
    for (index, light) in scene.lights {
        renderer.set_light_source(light, index);
    }

    // Scene setup is not frame time.
    clock.reset();
    for frame in 0..args.frames {
        // Second half of the run drops the virtual ground from every query.
        let mask = if frame < args.frames / 2 {
            SceneMask::ALL
        } else {
            SceneMask::ALL & !SceneMask::VIRTUAL
        };

        let mut command_buffer = queue.command_buffer(format!("frame {frame}"));
        let outputs = renderer.render(&mut command_buffer, mask)?;
        let submission = command_buffer.commit()?;
        let time = clock.tick();

        log::info!(
            "frame {} ({:?}): submission {submission}, {} dispatches, {} shadows, illumination x{} in {:.2?}",
            time.frame_index,
            mask,
            command_buffer.dispatch_count(),
            outputs.shadows.len(),
            outputs.illumination.frame_count,
            time.dt
        );
    }

    for index in renderer.light_indices() {
        if let Some(unit) = renderer.light_shadow(index) {
            log::info!("light {index}: {} shadow passes", unit.regenerations());
        }
    }
    log::info!("illumination averaged over {} frames", renderer.illumination_frames());
    if let Some(average) = clock.average() {
        log::info!("{} frames, {average:.2?} per frame", clock.frames());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args> {
        Args::parse(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn defaults_without_arguments() {
        assert_eq!(parse(&[]).unwrap(), Args::default());
    }

    #[test]
    fn parses_every_flag() {
        let args = parse(&["--frames", "3", "--size", "320x200", "--headless", "--log", "debug"]).unwrap();
        assert_eq!(
            args,
            Args {
                frames: 3,
                resolution: [320, 200],
                headless: true,
                log_filter: Some("debug".to_owned()),
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&["--frames"]).is_err());
        assert!(parse(&["--size", "0x10"]).is_err());
        assert!(parse(&["--size", "wide"]).is_err());
        assert!(parse(&["--bogus"]).is_err());
    }

    #[test]
    fn headless_run_completes() {
        let device = Arc::new(HeadlessDevice::new(HeadlessInit::with_kernels(KERNEL_NAMES)));
        let args = Args {
            frames: 4,
            resolution: [32, 32],
            headless: true,
            log_filter: None,
        };
        run(Arc::clone(&device), &args).unwrap();

        assert_eq!(device.submission_count(), 4);
        // Shadows regenerate only when the mask flips; illumination runs every frame.
        assert_eq!(device.submitted_dispatches().len(), 2 + 2 + 4);
    }
}
