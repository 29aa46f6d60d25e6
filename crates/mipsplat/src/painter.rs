//! The MIP painter: one `render` call runs a whole frame on this rank.
//!
//! Every rank with bound input takes part in the reduction, so every rank of
//! the group must call [`MipPainter::render`] (and [`MipPainter::update_bounds`])
//! the same number of times, in the same order.

use crate::accumulator::{
    accumulate_points, AccumulateStats, MipBuffer, MipImage, ParticleFilter, ScalarSource,
};
use crate::bounds::{global_bounds, Bounds};
use crate::color::{ColorMapper, TransferFunction};
use crate::comm::{ProcessGroup, ReduceOp};
use crate::compositor::{colorize, present, RenderTarget};
use crate::data::{Attributes, DataArray, PointSet, Rgb8};
use crate::error::MipError;
use crate::projector::Projector;
use crate::settings::{ArrayAccess, MipSettings, ScalarMode};
use crate::viewport::{resolve_viewport, TileLayout, TiledViewport, ViewportGeometry};
use glam::DMat4;
use std::sync::Arc;
use std::time::Instant;

/// Rank that receives the reduced image and composites it.
pub const REDUCTION_ROOT: usize = 0;

/// Per-frame inputs from the surrounding renderer.
pub struct Frame<'a> {
    /// Combined world → clip matrix (camera view, projection, tiled aspect).
    pub projection: DMat4,
    /// Scene background, components in `[0, 1]`.
    pub background: [f64; 3],
    /// Logical size/origin of the whole tiled image.
    pub tiled: TiledViewport,
    /// This renderer's `[x_min, y_min, x_max, y_max]` fraction of the window.
    pub renderer_viewport: [f64; 4],
    /// Distributed-display layout, if one is running.
    pub tile_layout: Option<&'a dyn TileLayout>,
    /// Where the root presents the image. Other ranks may pass `None`.
    pub target: Option<&'a mut dyn RenderTarget>,
    /// When `false` the root stops after the reduction.
    pub want_color: bool,
}

impl<'a> Frame<'a> {
    /// A frame covering the whole `width x height` window.
    pub fn new(projection: DMat4, width: i32, height: i32) -> Self {
        Self {
            projection,
            background: [0.0; 3],
            tiled: TiledViewport::new(width, height),
            renderer_viewport: [0.0, 0.0, 1.0, 1.0],
            tile_layout: None,
            target: None,
            want_color: true,
        }
    }

    pub fn with_background(mut self, rgb: [f64; 3]) -> Self {
        self.background = rgb;
        self
    }

    pub fn with_target(mut self, target: &'a mut dyn RenderTarget) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_tile_layout(mut self, layout: &'a dyn TileLayout) -> Self {
        self.tile_layout = Some(layout);
        self
    }
}

/// What a frame did on this rank.
#[derive(Debug, Default)]
pub struct FrameReport {
    /// `None` when nothing was rendered (no input, or an empty viewport).
    pub geometry: Option<ViewportGeometry>,
    pub stats: AccumulateStats,
    /// Reduced maxima; root only.
    pub image: Option<MipImage>,
    /// Coloured image, bottom row first; root only, when colour was wanted.
    pub rgb: Option<Vec<Rgb8>>,
    pub presented: bool,
}

/// Renders point scalars as a maximum intensity projection across a process
/// group.
pub struct MipPainter {
    settings: MipSettings,
    colors: ColorMapper,
    group: Option<Arc<dyn ProcessGroup>>,
    input: Option<Arc<PointSet>>,
}

impl MipPainter {
    /// `group` is `None` for single-process rendering.
    pub fn new(group: Option<Arc<dyn ProcessGroup>>) -> Self {
        Self {
            settings: MipSettings::default(),
            colors: ColorMapper::default(),
            group,
            input: None,
        }
    }

    pub fn settings(&self) -> &MipSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut MipSettings {
        &mut self.settings
    }

    pub fn set_input(&mut self, input: Option<Arc<PointSet>>) {
        self.input = input;
    }

    pub fn input(&self) -> Option<&Arc<PointSet>> {
        self.input.as_ref()
    }

    /// `None` selects the default lookup table.
    pub fn set_transfer_function(&mut self, function: Option<TransferFunction>) {
        self.colors.set_transfer_function(function);
    }

    pub fn color_mapper(&self) -> &ColorMapper {
        &self.colors
    }

    pub fn rank(&self) -> usize {
        self.group.as_ref().map_or(0, |g| g.rank())
    }

    pub fn is_root(&self) -> bool {
        self.rank() == REDUCTION_ROOT
    }

    /// Global bounds of the input over all ranks, or `None` without input.
    /// Collective.
    pub fn global_bounds(&self) -> Result<Option<Bounds>, MipError> {
        let Some(input) = &self.input else {
            return Ok(None);
        };
        Ok(Some(global_bounds(input.bounds(), self.group.as_deref())?))
    }

    /// Writes `[min_x, max_x, min_y, max_y, min_z, max_z]` of the global point
    /// set into `bounds`. Without input this is a no-op and performs no
    /// collective.
    pub fn update_bounds(&self, bounds: &mut [f64; 6]) -> Result<(), MipError> {
        if let Some(global) = self.global_bounds()? {
            *bounds = global.to_array();
        }
        Ok(())
    }

    pub fn render(&mut self, frame: Frame<'_>) -> Result<FrameReport, MipError> {
        let Some(input) = self.input.clone() else {
            log::trace!("no input bound; nothing to render");
            return Ok(FrameReport::default());
        };

        let Some(geometry) =
            resolve_viewport(&frame.tiled, frame.renderer_viewport, frame.tile_layout)
        else {
            return Ok(FrameReport::default());
        };

        let started = Instant::now();
        let projector = Projector::new(frame.projection, &geometry);
        let scalars = select_scalars(&input, &self.settings);
        let filter = self
            .settings
            .particle_filtering()
            .then(|| particle_filter(&input, &self.settings));

        let buffer = MipBuffer::new(geometry.width, geometry.height);
        let stats = accumulate_points(
            input.coords(),
            &scalars,
            filter.as_ref(),
            &projector,
            &buffer,
        );

        log::debug!(
            "rank {}: {} points, {} accumulated, {} offscreen, {} degenerate, {} filtered in {:?}",
            self.rank(),
            stats.visited,
            stats.accumulated,
            stats.offscreen,
            stats.degenerate,
            stats.filtered,
            started.elapsed()
        );

        let local = buffer.into_values();
        let reduced = match &self.group {
            Some(group) => group.reduce(&local, ReduceOp::Max, REDUCTION_ROOT)?,
            None => Some(local),
        };

        let mut report = FrameReport {
            geometry: Some(geometry),
            stats,
            ..FrameReport::default()
        };

        let Some(values) = reduced else {
            return Ok(report);
        };
        let image = MipImage::new(geometry.width, geometry.height, values);

        if frame.want_color {
            // Finalized here, single-threaded, before the parallel lookups.
            let table = self.colors.build_if_needed(self.settings.range_override());
            let rgb = colorize(&image, table, Rgb8::from_unit(frame.background));

            if let Some(target) = frame.target {
                present(target, geometry.width, geometry.height, &rgb)?;
                report.presented = true;
            }
            report.rgb = Some(rgb);
        }

        log::debug!(
            "root: {} of {} pixels covered, composited in {:?}",
            image.covered(),
            geometry.pixel_count(),
            started.elapsed()
        );
        report.image = Some(image);
        Ok(report)
    }
}

fn field_array<'a>(attrs: &'a Attributes, access: &ArrayAccess) -> Option<&'a DataArray> {
    match access {
        ArrayAccess::ById(id) => attrs.get(*id),
        ArrayAccess::ByName(name) => attrs.by_name(name),
    }
}

/// Picks the scalar array per the settings and resolves how it reduces to
/// one value per point. Unusable arrays degrade to a constant 0.
fn select_scalars<'a>(input: &'a PointSet, settings: &MipSettings) -> ScalarSource<'a> {
    let pd = input.point_data();
    let cd = input.cell_data();

    let (array, from_cells) = match settings.scalar_mode {
        ScalarMode::Default => match pd.scalars() {
            Some(a) => (Some(a), false),
            None => (cd.scalars(), true),
        },
        ScalarMode::UsePointData => (pd.scalars(), false),
        ScalarMode::UseCellData => (cd.scalars(), true),
        ScalarMode::UsePointFieldData => (field_array(pd, &settings.array_access), false),
        ScalarMode::UseCellFieldData => (field_array(cd, &settings.array_access), true),
    };

    let Some(array) = array else {
        return ScalarSource::Constant;
    };

    let n = input.len();
    let fits = if from_cells {
        array.tuples() == n
    } else {
        array.tuples() >= n
    };
    if !fits {
        log::warn!(
            "scalar array '{}' has {} tuples for {} points; ignoring it",
            array.name(),
            array.tuples(),
            n
        );
        return ScalarSource::Constant;
    }

    match ScalarSource::for_array(array, settings.array_component) {
        Some(source) => source,
        None => {
            log::warn!(
                "scalar array '{}' must be float or double (is {}); ignoring it",
                array.name(),
                array.kind()
            );
            ScalarSource::Constant
        }
    }
}

/// Looks up a named per-point filter array, dropping it if it is too short.
fn filter_array<'a>(input: &'a PointSet, name: Option<&str>, role: &str) -> Option<&'a DataArray> {
    let name = name?;
    let Some(array) = input.point_data().by_name(name) else {
        log::warn!("{} array '{}' not found; not filtering on it", role, name);
        return None;
    };
    if array.tuples() < input.len() {
        log::warn!(
            "{} array '{}' has {} tuples for {} points; not filtering on it",
            role,
            name,
            array.tuples(),
            input.len()
        );
        return None;
    }
    Some(array)
}

fn particle_filter<'a>(input: &'a PointSet, settings: &'a MipSettings) -> ParticleFilter<'a> {
    ParticleFilter {
        types: filter_array(input, settings.type_scalars.as_deref(), "type"),
        active: filter_array(input, settings.active_scalars.as_deref(), "active"),
        table: settings.particle_types(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::EMPTY_PIXEL;
    use crate::compositor::ImageTarget;

    /// Identity projection over a 20x20 window: world (x, y) in [-1, 1] maps
    /// straight to NDC.
    fn frame<'a>() -> Frame<'a> {
        Frame::new(DMat4::IDENTITY, 20, 20)
    }

    fn cloud(points: Vec<[f64; 3]>, rho: Vec<f64>) -> Arc<PointSet> {
        let mut ps = PointSet::from_f64(points);
        ps.point_data_mut().add_array(DataArray::from_f64("rho", 1, rho));
        ps.point_data_mut().set_active_scalars("rho");
        Arc::new(ps)
    }

    #[test]
    fn no_input_is_a_silent_no_op() {
        let mut painter = MipPainter::new(None);
        let mut target = ImageTarget::new(20, 20);
        let report = painter.render(frame().with_target(&mut target)).unwrap();
        assert!(report.geometry.is_none());
        assert!(!report.presented);

        let mut bounds = [7.0; 6];
        painter.update_bounds(&mut bounds).unwrap();
        assert_eq!(bounds, [7.0; 6]);
    }

    #[test]
    fn three_points_same_pixel_keep_max() {
        let mut painter = MipPainter::new(None);
        painter.set_input(Some(cloud(vec![[0.0, 0.0, 0.0]; 3], vec![1.0, 5.0, 3.0])));

        let report = painter.render(frame()).unwrap();

        let image = report.image.unwrap();
        assert_eq!(image.get(10, 10), 5.0);
        assert_eq!(image.covered(), 1);
    }

    #[test]
    fn render_presents_background_and_colours() {
        let mut painter = MipPainter::new(None);
        painter.set_transfer_function(Some(TransferFunction::grayscale()));
        painter.set_input(Some(cloud(vec![[0.0, 0.0, 0.0]], vec![1.0])));

        let bg = [0.2, 0.4, 0.6];
        let mut target = ImageTarget::new(20, 20);
        let report = painter
            .render(frame().with_background(bg).with_target(&mut target))
            .unwrap();

        assert!(report.presented);
        assert_eq!(target.pixel(10, 10), Rgb8::new(255, 255, 255));
        assert_eq!(target.pixel(0, 0), Rgb8::from_unit(bg));
        assert_eq!(target.pixel(19, 19), Rgb8::from_unit(bg));
    }

    #[test]
    fn range_override_changes_colours() {
        let mut painter = MipPainter::new(None);
        painter.set_transfer_function(Some(TransferFunction::grayscale()));
        painter.settings_mut().set_scalar_range(0.0, 2.0);
        painter.set_input(Some(cloud(vec![[0.0, 0.0, 0.0]], vec![1.0])));

        let report = painter.render(frame()).unwrap();
        let rgb = report.rgb.unwrap();
        assert_eq!(rgb[10 + 10 * 20], Rgb8::new(128, 128, 128));
    }

    #[test]
    fn want_color_false_stops_after_reduction() {
        let mut painter = MipPainter::new(None);
        painter.set_input(Some(cloud(vec![[0.0, 0.0, 0.0]], vec![2.0])));
        let mut f = frame();
        f.want_color = false;
        let report = painter.render(f).unwrap();
        assert!(report.rgb.is_none());
        assert_eq!(report.image.unwrap().get(10, 10), 2.0);
    }

    #[test]
    fn integer_scalars_fall_back_to_zero() {
        let mut ps = PointSet::from_f64(vec![[0.0, 0.0, 0.0]]);
        ps.point_data_mut().add_array(DataArray::from_i32("ids", 1, vec![42]));
        ps.point_data_mut().set_active_scalars("ids");
        let mut painter = MipPainter::new(None);
        painter.set_input(Some(Arc::new(ps)));

        let image = painter.render(frame()).unwrap().image.unwrap();
        assert_eq!(image.get(10, 10), 0.0);
    }

    #[test]
    fn field_data_selection_by_name_and_id() {
        let mut ps = PointSet::from_f64(vec![[0.0, 0.0, 0.0]]);
        ps.point_data_mut().add_array(DataArray::from_f64("a", 1, vec![3.0]));
        ps.point_data_mut().add_array(DataArray::from_f64("b", 2, vec![6.0, 8.0]));
        let ps = Arc::new(ps);

        let mut painter = MipPainter::new(None);
        painter.set_input(Some(ps));
        painter.settings_mut().set_scalar_mode(ScalarMode::UsePointFieldData);

        painter.settings_mut().set_array_name("b");
        assert_eq!(painter.render(frame()).unwrap().image.unwrap().get(10, 10), 10.0);

        painter.settings_mut().set_array_id(0);
        assert_eq!(painter.render(frame()).unwrap().image.unwrap().get(10, 10), 3.0);

        painter.settings_mut().set_array_id(1);
        painter.settings_mut().set_array_component(Some(0));
        assert_eq!(painter.render(frame()).unwrap().image.unwrap().get(10, 10), 6.0);
    }

    #[test]
    fn cell_scalars_need_one_tuple_per_point() {
        let mut ps = PointSet::from_f64(vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.0]]);
        ps.cell_data_mut().add_array(DataArray::from_f64("c", 1, vec![4.0]));
        ps.cell_data_mut().set_active_scalars("c");
        let mut painter = MipPainter::new(None);
        painter.set_input(Some(Arc::new(ps)));

        // Default mode falls back to cell scalars, which are too short here.
        let image = painter.render(frame()).unwrap().image.unwrap();
        assert_eq!(image.get(10, 10), 0.0);
    }

    #[test]
    fn filtering_is_off_by_default_and_applies_when_enabled() {
        let mut ps = PointSet::from_f64(vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.0]]);
        ps.point_data_mut().add_array(DataArray::from_f64("rho", 1, vec![1.0, 2.0]));
        ps.point_data_mut().set_active_scalars("rho");
        ps.point_data_mut().add_array(DataArray::from_i32("type", 1, vec![0, 1]));

        let mut painter = MipPainter::new(None);
        painter.set_input(Some(Arc::new(ps)));
        painter.settings_mut().set_type_scalars(Some("type".into()));
        painter.settings_mut().set_type_active(1, false);

        let image = painter.render(frame()).unwrap().image.unwrap();
        assert_eq!(image.covered(), 2);

        painter.settings_mut().set_particle_filtering(true);
        let report = painter.render(frame()).unwrap();
        assert_eq!(report.stats.filtered, 1);
        let image = report.image.unwrap();
        assert_eq!(image.covered(), 1);
        assert_eq!(image.get(10, 10), 1.0);
        assert_eq!(image.get(15, 15), EMPTY_PIXEL);
    }

    #[test]
    fn bounds_single_process_are_local() {
        let mut painter = MipPainter::new(None);
        painter.set_input(Some(cloud(
            vec![[1.0, -2.0, 3.0], [-4.0, 5.0, 0.5]],
            vec![0.0, 0.0],
        )));
        let mut bounds = [0.0; 6];
        painter.update_bounds(&mut bounds).unwrap();
        assert_eq!(bounds, [-4.0, 1.0, -2.0, 5.0, 0.5, 3.0]);
    }
}
