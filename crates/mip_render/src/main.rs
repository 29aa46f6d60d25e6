mod config;
mod scene;

use anyhow::{bail, Context, Result};
use clap::Parser;
use config::Config;
use log::{info, warn};
use mipsplat::comm::{TcpGroup, ThreadGroup};
use mipsplat::{Camera, Frame, ImageTarget, MipPainter, ProcessGroup, Rgb8};
use scene::Scene;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = Config::parse();
    if cfg.width == 0 || cfg.height == 0 {
        bail!("image size must be non-zero, got {}x{}", cfg.width, cfg.height);
    }

    let scene = match (&cfg.input, cfg.synthetic) {
        (Some(path), _) => scene::load(path)?,
        (None, Some(n)) => {
            info!("generating {} synthetic points (seed {})", n, cfg.seed);
            scene::synthetic(n, cfg.seed)
        }
        (None, None) => bail!("either --input or --synthetic is required"),
    };

    let started = Instant::now();
    let framebuffer = match cfg.tcp_rank {
        Some(rank) => run_tcp(&cfg, &scene, rank)?,
        None => run_threads(&cfg, &scene)?,
    };

    if let Some(target) = framebuffer {
        image::RgbImage::from_raw(cfg.width, cfg.height, target.to_top_down_rgb())
            .context("framebuffer size does not match the image")?
            .save(&cfg.output)
            .with_context(|| format!("writing {}", cfg.output.display()))?;
        info!(
            "wrote {}x{} image to {} in {:?}",
            cfg.width,
            cfg.height,
            cfg.output.display(),
            started.elapsed()
        );
    }
    Ok(())
}

/// Runs `cfg.ranks` ranks as threads of this process.
fn run_threads(cfg: &Config, scene: &Scene) -> Result<Option<ImageTarget>> {
    if cfg.ranks <= 1 {
        return render_rank(cfg, None, scene.clone());
    }

    info!("rendering on {} thread ranks", cfg.ranks);
    let parts = scene.split(cfg.ranks);
    let results: Vec<Result<Option<ImageTarget>>> = thread::scope(|s| {
        let handles: Vec<_> = ThreadGroup::new(cfg.ranks)
            .into_iter()
            .zip(parts)
            .map(|(rank, part)| {
                s.spawn(move || {
                    let group: Arc<dyn ProcessGroup> = Arc::new(rank);
                    render_rank(cfg, Some(group), part)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("render thread panicked")))
            })
            .collect()
    });

    let mut root = None;
    for result in results {
        if let Some(target) = result? {
            root = Some(target);
        }
    }
    Ok(root)
}

/// Joins a TCP group and renders this process's round-robin share.
fn run_tcp(cfg: &Config, scene: &Scene, rank: usize) -> Result<Option<ImageTarget>> {
    let (Some(size), Some(root)) = (cfg.tcp_size, cfg.tcp_root.as_deref()) else {
        bail!("--tcp-rank needs --tcp-size and --tcp-root");
    };

    info!("rank {}/{}: joining group at {}", rank, size, root);
    let group = TcpGroup::join(
        root,
        rank,
        size,
        Duration::from_secs(cfg.connect_timeout_secs),
    )
    .with_context(|| format!("joining TCP group at {root}"))?;

    let group: Arc<dyn ProcessGroup> = Arc::new(group);
    let part = scene.split(size).swap_remove(rank);
    render_rank(cfg, Some(group), part)
}

/// Renders one rank's points. Returns the framebuffer on the root rank.
fn render_rank(
    cfg: &Config,
    group: Option<Arc<dyn ProcessGroup>>,
    part: Scene,
) -> Result<Option<ImageTarget>> {
    let mut painter = MipPainter::new(group);
    painter.set_transfer_function(Some(cfg.colormap.transfer_function()));
    {
        let settings = painter.settings_mut();
        settings.set_array_component(cfg.component);
        if let Some([lo, hi]) = cfg.range() {
            settings.set_scalar_range(lo, hi);
        }
    }
    let points = part.len();
    painter.set_input(Some(Arc::new(part.into_point_set())));

    let mut camera = Camera::default();
    camera.fov_y_rad = cfg.fov.to_radians();
    camera.azimuth_rad = cfg.azimuth.to_radians();
    camera.elevation_rad = cfg.elevation.to_radians();
    match painter.global_bounds()? {
        Some(bounds) if !bounds.is_empty() => camera.frame_bounds(&bounds),
        _ => warn!("no points on any rank; the image will be background only"),
    }
    camera.radius *= cfg.zoom_out;
    camera.far *= cfg.zoom_out;
    camera.update();

    let (width, height) = (cfg.width as usize, cfg.height as usize);
    let aspect = width as f64 / height as f64;
    let mut target = ImageTarget::new(width, height);
    target.clear(Rgb8::from_unit(cfg.background));

    let frame = Frame::new(
        camera.composite_projection(aspect),
        cfg.width as i32,
        cfg.height as i32,
    )
    .with_background(cfg.background);
    let frame = if painter.is_root() {
        frame.with_target(&mut target)
    } else {
        frame
    };

    let report = painter.render(frame)?;
    info!(
        "rank {}: {} points, {} projected, {} offscreen",
        painter.rank(),
        points,
        report.stats.accumulated,
        report.stats.offscreen
    );
    if let Some(image) = &report.image {
        info!(
            "{} of {} pixels covered",
            image.covered(),
            image.width * image.height
        );
    }

    Ok(report.presented.then_some(target))
}
