//! Scalar → colour mapping.
//!
//! A [`TransferFunction`] is the editable description (piecewise-linear RGB
//! nodes). Building it yields a [`ColorTable`]: immutable, `Sync`, and cheap to
//! query from many threads at once. The [`ColorMapper`] owns the function,
//! applies range overrides and rebuilds the table only when its inputs change.

use crate::data::Rgb8;

/// Number of entries in a built [`ColorTable`].
pub const DEFAULT_TABLE_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorNode {
    pub x: f64,
    pub rgb: [f64; 3],
}

impl ColorNode {
    pub const fn new(x: f64, rgb: [f64; 3]) -> Self {
        Self { x, rgb }
    }
}

/// Piecewise-linear RGB transfer function over a scalar domain.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFunction {
    nodes: Vec<ColorNode>,
    table_size: usize,
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self::rainbow()
    }
}

impl TransferFunction {
    /// Builds a function from nodes in any order. An empty node list gives
    /// the grayscale ramp over `[0, 1]`.
    pub fn from_nodes(mut nodes: Vec<ColorNode>) -> Self {
        if nodes.is_empty() {
            log::warn!("transfer function without nodes; using grayscale");
            return Self::grayscale();
        }
        nodes.sort_by(|a, b| a.x.total_cmp(&b.x));
        Self {
            nodes,
            table_size: DEFAULT_TABLE_SIZE,
        }
    }

    /// The default lookup table: HSV hue swept from 0 (red) to 2/3 (blue) at
    /// full saturation and value over `[0, 1]`. That sweep is exactly linear in
    /// RGB between the primary/secondary hues, so five nodes reproduce it.
    pub fn rainbow() -> Self {
        Self::from_nodes(vec![
            ColorNode::new(0.00, [1.0, 0.0, 0.0]),
            ColorNode::new(0.25, [1.0, 1.0, 0.0]),
            ColorNode::new(0.50, [0.0, 1.0, 0.0]),
            ColorNode::new(0.75, [0.0, 1.0, 1.0]),
            ColorNode::new(1.00, [0.0, 0.0, 1.0]),
        ])
    }

    pub fn grayscale() -> Self {
        Self {
            nodes: vec![
                ColorNode::new(0.0, [0.0, 0.0, 0.0]),
                ColorNode::new(1.0, [1.0, 1.0, 1.0]),
            ],
            table_size: DEFAULT_TABLE_SIZE,
        }
    }

    /// Diverging blue → white → red map.
    pub fn cool_to_warm() -> Self {
        Self::from_nodes(vec![
            ColorNode::new(0.0, [0.230, 0.299, 0.754]),
            ColorNode::new(0.5, [0.865, 0.865, 0.865]),
            ColorNode::new(1.0, [0.706, 0.016, 0.150]),
        ])
    }

    /// Looks up a preset by name (`rainbow`, `grayscale`, `cool_to_warm`).
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "rainbow" => Some(Self::rainbow()),
            "grayscale" | "gray" => Some(Self::grayscale()),
            "cool_to_warm" | "coolwarm" => Some(Self::cool_to_warm()),
            _ => None,
        }
    }

    pub fn with_table_size(mut self, n: usize) -> Self {
        self.table_size = n.max(1);
        self
    }

    pub fn nodes(&self) -> &[ColorNode] {
        &self.nodes
    }

    /// Domain covered by the nodes.
    pub fn range(&self) -> [f64; 2] {
        match (self.nodes.first(), self.nodes.last()) {
            (Some(a), Some(b)) => [a.x, b.x],
            _ => [0.0, 1.0],
        }
    }

    /// Rescales node positions linearly so the domain becomes `[lo, hi]`.
    pub fn set_range(&mut self, lo: f64, hi: f64) {
        let (lo, hi) = (lo.min(hi), lo.max(hi));
        let [a, b] = self.range();
        let n = self.nodes.len();

        for (i, node) in self.nodes.iter_mut().enumerate() {
            let t = if b > a {
                (node.x - a) / (b - a)
            } else if n > 1 {
                i as f64 / (n - 1) as f64
            } else {
                0.0
            };
            node.x = lo + t * (hi - lo);
        }
    }

    /// Linearly interpolated colour at `x`; clamps outside the domain.
    pub fn color_at(&self, x: f64) -> [f64; 3] {
        let nodes = &self.nodes;
        let Some(first) = nodes.first() else {
            return [0.0; 3];
        };
        if x <= first.x {
            return first.rgb;
        }
        // Index of the first node strictly right of x.
        let hi = nodes.partition_point(|n| n.x <= x);
        if hi >= nodes.len() {
            return nodes[nodes.len() - 1].rgb;
        }
        let (l, r) = (&nodes[hi - 1], &nodes[hi]);
        let t = (x - l.x) / (r.x - l.x);
        [
            l.rgb[0] + t * (r.rgb[0] - l.rgb[0]),
            l.rgb[1] + t * (r.rgb[1] - l.rgb[1]),
            l.rgb[2] + t * (r.rgb[2] - l.rgb[2]),
        ]
    }

    /// Samples the function into a lookup table. The first and last entries
    /// hold the exact end colours.
    pub fn build(&self) -> ColorTable {
        let [lo, hi] = self.range();
        let n = self.table_size;
        let step = if n > 1 { (hi - lo) / (n - 1) as f64 } else { 0.0 };
        let entries = (0..n)
            .map(|i| Rgb8::from_unit(self.color_at(lo + i as f64 * step)))
            .collect();
        ColorTable::new(lo, hi, entries)
    }
}

/// A finalized lookup table. Read-only, so safe to share across the
/// per-pixel worker threads.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorTable {
    lo: f64,
    hi: f64,
    scale: f64,
    entries: Vec<Rgb8>,
}

impl ColorTable {
    fn new(lo: f64, hi: f64, entries: Vec<Rgb8>) -> Self {
        let scale = if hi > lo {
            entries.len() as f64 / (hi - lo)
        } else {
            0.0
        };
        Self {
            lo,
            hi,
            scale,
            entries,
        }
    }

    pub fn range(&self) -> [f64; 2] {
        [self.lo, self.hi]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Colour for `v`. Values outside the range clamp to the end entries;
    /// NaN maps to the first entry.
    #[inline]
    pub fn map_value(&self, v: f64) -> Rgb8 {
        let last = self.entries.len() - 1;
        let idx = if self.scale > 0.0 {
            let f = (v - self.lo) * self.scale;
            // NaN fails both comparisons and lands on 0.
            if f >= last as f64 {
                last
            } else if f > 0.0 {
                f as usize
            } else {
                0
            }
        } else if v > self.lo {
            last
        } else {
            0
        };
        self.entries[idx]
    }
}

/// Owns the active transfer function and its built table.
#[derive(Debug, Default)]
pub struct ColorMapper {
    function: Option<TransferFunction>,
    /// Table together with the effective function it was built from.
    built: Option<(TransferFunction, ColorTable)>,
}

impl ColorMapper {
    pub fn new(function: Option<TransferFunction>) -> Self {
        Self {
            function,
            built: None,
        }
    }

    /// Replaces the transfer function; `None` selects the default table on
    /// the next build.
    pub fn set_transfer_function(&mut self, function: Option<TransferFunction>) {
        self.function = function;
    }

    pub fn transfer_function(&self) -> Option<&TransferFunction> {
        self.function.as_ref()
    }

    /// Finalizes the lookup table, creating the default function if none is
    /// set and applying `range_override` first. Must run before any
    /// concurrent lookup; rebuilds only when the effective function changed.
    pub fn build_if_needed(&mut self, range_override: Option<[f64; 2]>) -> &ColorTable {
        let function = self.function.get_or_insert_with(|| {
            log::debug!("no transfer function set; creating default lookup table");
            TransferFunction::default()
        });

        let mut effective = function.clone();
        if let Some([lo, hi]) = range_override {
            effective.set_range(lo, hi);
        }

        let built = match self.built.take() {
            Some((key, table)) if key == effective => (key, table),
            _ => {
                let table = effective.build();
                log::debug!(
                    "built colour table: {} entries over [{}, {}]",
                    table.len(),
                    table.lo,
                    table.hi
                );
                (effective, table)
            }
        };
        &self.built.insert(built).1
    }
}
