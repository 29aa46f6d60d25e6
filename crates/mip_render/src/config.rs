use clap::{Parser, ValueEnum};
use mipsplat::TransferFunction;
use std::path::PathBuf;

/// `mip_render` - renders a point cloud's scalar field as a maximum
/// intensity projection and writes it to a PNG.
///
/// Rendering can be split across several ranks, either threads of this
/// process (`--ranks`) or cooperating processes over TCP (`--tcp-*`). Rank 0
/// composites and writes the image.
#[derive(Parser, Debug, Clone)]
#[command(name = "mip_render", version, about, long_about = None)]
pub struct Config {
    /// Text point file, or a directory walked recursively for them.
    ///
    /// One point per line: `x y z [s ...]`. Extra columns form a single
    /// scalar array; blank lines and `#` comments are skipped.
    #[arg(long, env = "MIP_INPUT", required_unless_present = "synthetic")]
    pub input: Option<PathBuf>,

    /// Generate this many points in Gaussian blobs instead of reading a file.
    #[arg(long, env = "MIP_SYNTHETIC", conflicts_with = "input")]
    pub synthetic: Option<usize>,

    /// Seed for `--synthetic`.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Number of in-process ranks; points are dealt round-robin.
    #[arg(long, env = "MIP_RANKS", default_value_t = 1, conflicts_with = "tcp_rank")]
    pub ranks: usize,

    /// This process's rank in a TCP group.
    #[arg(long, env = "MIP_TCP_RANK", requires_all = ["tcp_size", "tcp_root"])]
    pub tcp_rank: Option<usize>,

    /// Number of processes in the TCP group.
    #[arg(long, env = "MIP_TCP_SIZE")]
    pub tcp_size: Option<usize>,

    /// Address rank 0 listens on and the others connect to.
    #[arg(long, env = "MIP_TCP_ROOT")]
    pub tcp_root: Option<String>,

    /// How long non-root ranks keep retrying the root (seconds).
    #[arg(long, default_value_t = 30)]
    pub connect_timeout_secs: u64,

    #[arg(long, env = "MIP_WIDTH", default_value_t = 800)]
    pub width: u32,

    #[arg(long, env = "MIP_HEIGHT", default_value_t = 600)]
    pub height: u32,

    /// Camera azimuth around +Z (degrees).
    #[arg(long, default_value_t = 45.0, allow_negative_numbers = true)]
    pub azimuth: f64,

    /// Camera elevation above the XY plane (degrees).
    #[arg(long, default_value_t = 30.0, allow_negative_numbers = true)]
    pub elevation: f64,

    /// Vertical field of view (degrees).
    #[arg(long, default_value_t = 30.0)]
    pub fov: f64,

    /// Multiplies the distance that just fits the data.
    #[arg(long, default_value_t = 1.0)]
    pub zoom_out: f64,

    /// Background colour as `r,g,b` in [0, 1].
    #[arg(long, default_value = "0,0,0", value_parser = parse_rgb)]
    pub background: [f64; 3],

    #[arg(long, value_enum, env = "MIP_COLORMAP", default_value_t = Colormap::Rainbow)]
    pub colormap: Colormap,

    /// Colour range `LO HI`; defaults to the colormap's own [0, 1].
    #[arg(long, num_args = 2, value_names = ["LO", "HI"], allow_negative_numbers = true)]
    pub range: Option<Vec<f64>>,

    /// Scalar component to render; multi-component arrays default to their
    /// magnitude.
    #[arg(long)]
    pub component: Option<usize>,

    #[arg(short, long, env = "MIP_OUTPUT", default_value = "mip.png")]
    pub output: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Colormap {
    Rainbow,
    Grayscale,
    CoolToWarm,
}

impl Colormap {
    pub fn transfer_function(self) -> TransferFunction {
        match self {
            Colormap::Rainbow => TransferFunction::rainbow(),
            Colormap::Grayscale => TransferFunction::grayscale(),
            Colormap::CoolToWarm => TransferFunction::cool_to_warm(),
        }
    }
}

impl Config {
    pub fn range(&self) -> Option<[f64; 2]> {
        match self.range.as_deref() {
            Some(&[lo, hi]) => Some([lo, hi]),
            _ => None,
        }
    }
}

fn parse_rgb(s: &str) -> Result<[f64; 3], String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("'{p}': {e}")))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        &[r, g, b] if [r, g, b].iter().all(|c| (0.0..=1.0).contains(c)) => Ok([r, g, b]),
        &[_, _, _] => Err("components must lie in [0, 1]".into()),
        _ => Err(format!("expected r,g,b, got {} values", parts.len())),
    }
}
