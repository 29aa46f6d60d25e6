//! Point coordinates plus point/cell attributes.

use super::arrays::Attributes;
use crate::bounds::Bounds;

/// Point positions in the precision the upstream source produced them.
#[derive(Debug, Clone)]
pub enum PointCoords {
    F32(Vec<[f32; 3]>),
    F64(Vec<[f64; 3]>),
}

impl PointCoords {
    #[inline]
    pub fn len(&self) -> usize {
        match self {
            PointCoords::F32(v) => v.len(),
            PointCoords::F64(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position `i` widened to double precision.
    #[inline]
    pub fn point(&self, i: usize) -> [f64; 3] {
        match self {
            PointCoords::F32(v) => {
                let p = v[i];
                [p[0] as f64, p[1] as f64, p[2] as f64]
            }
            PointCoords::F64(v) => v[i],
        }
    }
}

/// A point cloud as handed to the painter: optional coordinates (a rank may
/// hold no points at all) and attribute arrays.
#[derive(Debug, Clone, Default)]
pub struct PointSet {
    coords: Option<PointCoords>,
    point_data: Attributes,
    cell_data: Attributes,
}

impl PointSet {
    pub fn new(coords: PointCoords) -> Self {
        Self {
            coords: Some(coords),
            ..Self::default()
        }
    }

    /// A point set with no coordinate array.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_f32(points: Vec<[f32; 3]>) -> Self {
        Self::new(PointCoords::F32(points))
    }

    pub fn from_f64(points: Vec<[f64; 3]>) -> Self {
        Self::new(PointCoords::F64(points))
    }

    #[inline]
    pub fn coords(&self) -> Option<&PointCoords> {
        self.coords.as_ref()
    }

    /// Number of points; zero when no coordinate array is present.
    #[inline]
    pub fn len(&self) -> usize {
        self.coords.as_ref().map_or(0, PointCoords::len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn point_data(&self) -> &Attributes {
        &self.point_data
    }

    #[inline]
    pub fn point_data_mut(&mut self) -> &mut Attributes {
        &mut self.point_data
    }

    #[inline]
    pub fn cell_data(&self) -> &Attributes {
        &self.cell_data
    }

    #[inline]
    pub fn cell_data_mut(&mut self) -> &mut Attributes {
        &mut self.cell_data
    }

    /// Axis-aligned bounds of the local points; [`Bounds::EMPTY`] if none.
    pub fn bounds(&self) -> Bounds {
        match &self.coords {
            Some(PointCoords::F32(v)) => Bounds::of_points(v),
            Some(PointCoords::F64(v)) => Bounds::of_points(v),
            None => Bounds::EMPTY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_coords_means_zero_points() {
        let ps = PointSet::empty();
        assert_eq!(ps.len(), 0);
        assert!(ps.bounds().is_empty());
    }

    #[test]
    fn single_precision_points_widen() {
        let ps = PointSet::from_f32(vec![[0.5, -1.0, 2.0]]);
        assert_eq!(ps.coords().unwrap().point(0), [0.5, -1.0, 2.0]);
    }
}
