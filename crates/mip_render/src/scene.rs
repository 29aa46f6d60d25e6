//! Point sources for the renderer: text point files and synthetic blobs.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use mipsplat::{DataArray, PointSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions picked up when walking a directory.
const POINT_EXTENSIONS: &[&str] = &["txt", "xyz", "pts", "csv"];

/// Points plus an interleaved scalar array, before it becomes a `PointSet`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub points: Vec<[f64; 3]>,
    pub scalars: Vec<f64>,
    /// Scalar components per point; 0 when the input carried none.
    pub components: usize,
    pub scalar_name: String,
}

impl Scene {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Deals points out to `parts` scenes round-robin.
    pub fn split(&self, parts: usize) -> Vec<Scene> {
        let parts = parts.max(1);
        let mut out: Vec<Scene> = (0..parts)
            .map(|_| Scene {
                components: self.components,
                scalar_name: self.scalar_name.clone(),
                ..Scene::default()
            })
            .collect();
        let c = self.components;
        for (i, p) in self.points.iter().enumerate() {
            let part = &mut out[i % parts];
            part.points.push(*p);
            part.scalars.extend_from_slice(&self.scalars[i * c..(i + 1) * c]);
        }
        out
    }

    pub fn into_point_set(self) -> PointSet {
        let mut ps = PointSet::from_f64(self.points);
        if self.components > 0 {
            let attrs = ps.point_data_mut();
            attrs.add_array(DataArray::from_f64(
                self.scalar_name.as_str(),
                self.components,
                self.scalars,
            ));
            attrs.set_active_scalars(&self.scalar_name);
        }
        ps
    }
}

/// Reads one file, or every point file under a directory (sorted by path so
/// the point order is stable).
pub fn load(path: &Path) -> Result<Scene> {
    let files: Vec<PathBuf> = if path.is_dir() {
        let mut files: Vec<PathBuf> = WalkDir::new(path)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_ascii_lowercase())
                    .is_some_and(|ext| POINT_EXTENSIONS.contains(&ext.as_str()))
            })
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    if files.is_empty() {
        bail!("no point files found under {}", path.display());
    }

    let chunks: Vec<Scene> = files
        .par_iter()
        .map(|file| -> Result<Scene> {
            let text = fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let scene =
                parse_points(&text).with_context(|| format!("parsing {}", file.display()))?;
            debug!("{}: {} points", file.display(), scene.len());
            Ok(scene)
        })
        .collect::<Result<_>>()?;

    let mut merged = Scene {
        scalar_name: "scalars".into(),
        ..Scene::default()
    };
    for (file, chunk) in files.iter().zip(chunks) {
        if chunk.is_empty() {
            continue;
        }
        if merged.is_empty() {
            merged.components = chunk.components;
        } else if chunk.components != merged.components {
            bail!(
                "{} has {} scalar columns, earlier files have {}",
                file.display(),
                chunk.components,
                merged.components
            );
        }
        merged.points.extend(chunk.points);
        merged.scalars.extend(chunk.scalars);
    }

    info!(
        "loaded {} points from {} file(s), {} scalar component(s)",
        merged.len(),
        files.len(),
        merged.components
    );
    Ok(merged)
}

/// Parses `x y z [s ...]` lines. Every data line must carry the same number
/// of columns.
pub fn parse_points(text: &str) -> Result<Scene> {
    let mut scene = Scene {
        scalar_name: "scalars".into(),
        ..Scene::default()
    };
    let mut columns: Option<usize> = None;

    for (n, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let values: Vec<f64> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(str::parse::<f64>)
            .collect::<Result<_, _>>()
            .with_context(|| format!("line {}: not a number", n + 1))?;

        if values.len() < 3 {
            bail!("line {}: expected at least x y z", n + 1);
        }
        match columns {
            None => {
                columns = Some(values.len());
                scene.components = values.len() - 3;
            }
            Some(c) if c != values.len() => {
                bail!("line {}: {} columns, expected {}", n + 1, values.len(), c);
            }
            Some(_) => {}
        }
        scene.points.push([values[0], values[1], values[2]]);
        scene.scalars.extend_from_slice(&values[3..]);
    }
    Ok(scene)
}

/// `n` points scattered in a few Gaussian blobs inside the unit cube, each
/// carrying a density that peaks at its blob's centre.
pub fn synthetic(n: usize, seed: u64) -> Scene {
    let mut rng = StdRng::seed_from_u64(seed);
    let blobs: Vec<([f64; 3], f64)> = (0..5)
        .map(|_| {
            let c = [
                rng.gen_range(-0.6..0.6),
                rng.gen_range(-0.6..0.6),
                rng.gen_range(-0.6..0.6),
            ];
            (c, rng.gen_range(0.08..0.25))
        })
        .collect();

    let mut scene = Scene {
        points: Vec::with_capacity(n),
        scalars: Vec::with_capacity(n),
        components: 1,
        scalar_name: "density".into(),
    };
    for _ in 0..n {
        let (centre, sigma) = blobs[rng.gen_range(0..blobs.len())];
        let offset = [
            gaussian(&mut rng) * sigma,
            gaussian(&mut rng) * sigma,
            gaussian(&mut rng) * sigma,
        ];
        let r2 = offset.iter().map(|o| o * o).sum::<f64>();
        scene
            .points
            .push([centre[0] + offset[0], centre[1] + offset[1], centre[2] + offset[2]]);
        scene.scalars.push((-r2 / (2.0 * sigma * sigma)).exp());
    }
    scene
}

/// Standard normal sample (Box-Muller).
fn gaussian(rng: &mut impl Rng) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}
