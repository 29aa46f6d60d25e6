//! Per-pixel maximum accumulation.
//!
//! The per-point loop runs on the rayon pool and many points may hit the same
//! pixel at once, so every cell is an `AtomicU64` holding `f64` bits and is
//! raised with a compare-exchange loop. The result is the strict pixel-wise
//! maximum whatever order the points are processed in.

use crate::data::{DataArray, PointCoords, Samples};
use crate::projector::{Projected, Projector};
use crate::settings::ParticleTypeTable;
use rayon::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};

/// Marks a pixel no point has touched. Lower than every real value, so it is
/// also the identity of the cross-rank max reduction.
pub const EMPTY_PIXEL: f64 = f64::MIN;

/// Shared, lock-free `width x height` buffer of per-pixel maxima, indexed
/// `ix + iy * width`.
pub struct MipBuffer {
    width: usize,
    height: usize,
    cells: Vec<AtomicU64>,
}

impl MipBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        let empty = EMPTY_PIXEL.to_bits();
        Self {
            width,
            height,
            cells: (0..width * height).map(|_| AtomicU64::new(empty)).collect(),
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Raises pixel `(ix, iy)` to `value` if `value` is larger. NaN never
    /// wins.
    #[inline]
    pub fn accumulate(&self, ix: usize, iy: usize, value: f64) {
        let cell = &self.cells[ix + iy * self.width];
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            // `!(a > b)` keeps NaN out.
            if !(value > f64::from_bits(current)) {
                return;
            }
            match cell.compare_exchange_weak(
                current,
                value.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    #[inline]
    pub fn get(&self, ix: usize, iy: usize) -> f64 {
        f64::from_bits(self.cells[ix + iy * self.width].load(Ordering::Relaxed))
    }

    /// Plain values, ready for the cross-rank reduction.
    pub fn into_values(self) -> Vec<f64> {
        self.cells
            .into_iter()
            .map(|c| f64::from_bits(c.into_inner()))
            .collect()
    }
}

/// A finished (possibly reduced) buffer of per-pixel maxima.
#[derive(Debug, Clone, PartialEq)]
pub struct MipImage {
    pub width: usize,
    pub height: usize,
    pub values: Vec<f64>,
}

impl MipImage {
    pub fn new(width: usize, height: usize, values: Vec<f64>) -> Self {
        debug_assert_eq!(values.len(), width * height);
        Self {
            width,
            height,
            values,
        }
    }

    #[inline]
    pub fn get(&self, ix: usize, iy: usize) -> f64 {
        self.values[ix + iy * self.width]
    }

    #[inline]
    pub fn is_empty_pixel(&self, ix: usize, iy: usize) -> bool {
        self.get(ix, iy) == EMPTY_PIXEL
    }

    /// Number of pixels touched by at least one point.
    pub fn covered(&self) -> usize {
        self.values.iter().filter(|&&v| v != EMPTY_PIXEL).count()
    }
}

/// The effective per-point scalar.
#[derive(Debug, Clone, Copy)]
pub enum ScalarSource<'a> {
    /// No usable array: every point contributes 0.
    Constant,
    /// One component per tuple.
    Single(Samples<'a>),
    /// Euclidean norm of each tuple.
    Magnitude {
        samples: Samples<'a>,
        components: usize,
    },
    /// One chosen component of each tuple.
    Component {
        samples: Samples<'a>,
        components: usize,
        component: usize,
    },
}

impl<'a> ScalarSource<'a> {
    /// Picks the reduction for `array`: its single component, the requested
    /// component, or the magnitude. Integer arrays yield `None`.
    pub fn for_array(array: &'a DataArray, component: Option<usize>) -> Option<Self> {
        let samples = array.samples()?;
        let components = array.components();
        Some(match (components, component) {
            (1, _) => ScalarSource::Single(samples),
            (c, Some(k)) if k < c => ScalarSource::Component {
                samples,
                components: c,
                component: k,
            },
            (c, _) => ScalarSource::Magnitude {
                samples,
                components: c,
            },
        })
    }

    #[inline(always)]
    pub fn value(&self, i: usize) -> f64 {
        match *self {
            ScalarSource::Constant => 0.0,
            ScalarSource::Single(s) => s.get(i),
            ScalarSource::Magnitude {
                samples,
                components,
            } => {
                let base = i * components;
                (0..components)
                    .map(|c| {
                        let v = samples.get(base + c);
                        v * v
                    })
                    .sum::<f64>()
                    .sqrt()
            }
            ScalarSource::Component {
                samples,
                components,
                component,
            } => samples.get(i * components + component),
        }
    }
}

/// Per-point type/active filter.
#[derive(Debug, Clone, Copy)]
pub struct ParticleFilter<'a> {
    pub types: Option<&'a DataArray>,
    pub active: Option<&'a DataArray>,
    pub table: &'a ParticleTypeTable,
}

impl ParticleFilter<'_> {
    #[inline]
    pub fn keep(&self, i: usize) -> bool {
        let ptype = self
            .types
            .map_or(0, |a| self.table.clamp_type(a.component(i, 0)));
        self.table.is_active(ptype) && self.active.map_or(true, |a| a.component(i, 0) != 0.0)
    }
}

/// Counters for one rank's accumulation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccumulateStats {
    pub visited: u64,
    pub accumulated: u64,
    pub offscreen: u64,
    pub degenerate: u64,
    pub filtered: u64,
}

impl AccumulateStats {
    fn merge(self, o: Self) -> Self {
        Self {
            visited: self.visited + o.visited,
            accumulated: self.accumulated + o.accumulated,
            offscreen: self.offscreen + o.offscreen,
            degenerate: self.degenerate + o.degenerate,
            filtered: self.filtered + o.filtered,
        }
    }
}

/// Projects every point and folds its scalar into `buffer`, in parallel.
pub fn accumulate_points(
    coords: Option<&PointCoords>,
    scalars: &ScalarSource<'_>,
    filter: Option<&ParticleFilter<'_>>,
    projector: &Projector,
    buffer: &MipBuffer,
) -> AccumulateStats {
    match coords {
        Some(PointCoords::F32(pts)) => accumulate_slice(pts, scalars, filter, projector, buffer),
        Some(PointCoords::F64(pts)) => accumulate_slice(pts, scalars, filter, projector, buffer),
        None => AccumulateStats::default(),
    }
}

fn accumulate_slice<T>(
    points: &[[T; 3]],
    scalars: &ScalarSource<'_>,
    filter: Option<&ParticleFilter<'_>>,
    projector: &Projector,
    buffer: &MipBuffer,
) -> AccumulateStats
where
    T: Copy + Into<f64> + Sync,
{
    points
        .par_iter()
        .enumerate()
        .fold(AccumulateStats::default, |mut st, (i, p)| {
            st.visited += 1;
            if filter.is_some_and(|f| !f.keep(i)) {
                st.filtered += 1;
                return st;
            }
            match projector.project([p[0].into(), p[1].into(), p[2].into()]) {
                Projected::Pixel(ix, iy) => {
                    buffer.accumulate(ix, iy, scalars.value(i));
                    st.accumulated += 1;
                }
                Projected::Offscreen => st.offscreen += 1,
                Projected::Degenerate => {
                    log::trace!("point {} has w == 0; skipped", i);
                    st.degenerate += 1;
                }
            }
            st
        })
        .reduce(AccumulateStats::default, AccumulateStats::merge)
}
