//! Painter configuration, mutated between frames and read during a frame.

/// Where the scalar array is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalarMode {
    /// Active point scalars, falling back to active cell scalars.
    #[default]
    Default,
    /// Active point scalars only.
    UsePointData,
    /// Active cell scalars only.
    UseCellData,
    /// A point array selected by [`ArrayAccess`].
    UsePointFieldData,
    /// A cell array selected by [`ArrayAccess`].
    UseCellFieldData,
}

/// How field-data modes pick their array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayAccess {
    ById(usize),
    ByName(String),
}

impl Default for ArrayAccess {
    fn default() -> Self {
        ArrayAccess::ById(0)
    }
}

/// Enabled flag per particle-type id. Grows on demand, never shrinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticleTypeTable {
    active: Vec<bool>,
}

impl Default for ParticleTypeTable {
    fn default() -> Self {
        Self { active: vec![true] }
    }
}

impl ParticleTypeTable {
    #[inline]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Grows the table to at least `n` entries; new types start enabled.
    pub fn ensure(&mut self, n: usize) {
        if n > self.active.len() {
            self.active.resize(n, true);
        }
    }

    pub fn set_active(&mut self, ptype: usize, active: bool) {
        self.ensure(ptype + 1);
        self.active[ptype] = active;
    }

    /// Unknown types report `false`.
    #[inline]
    pub fn is_active(&self, ptype: usize) -> bool {
        self.active.get(ptype).copied().unwrap_or(false)
    }

    /// Maps a raw type value from the data onto a table index; values that
    /// are negative, non-finite or past the end of the table fall back to 0.
    #[inline]
    pub fn clamp_type(&self, raw: f64) -> usize {
        if raw.is_finite() && raw >= 0.0 && (raw as usize) < self.active.len() {
            raw as usize
        } else {
            0
        }
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.active
    }
}

/// Everything the painter reads from its configuration during a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MipSettings {
    pub scalar_mode: ScalarMode,
    pub array_access: ArrayAccess,
    /// When set, multi-component scalars use this component instead of
    /// their magnitude.
    pub array_component: Option<usize>,
    /// When `false`, `scalar_range` overrides the transfer function's range.
    pub use_lookup_table_scalar_range: bool,
    pub scalar_range: [f64; 2],
    /// Name of the point array holding per-point type ids.
    pub type_scalars: Option<String>,
    /// Name of the point array holding per-point active flags.
    pub active_scalars: Option<String>,
    particle_types: ParticleTypeTable,
    active_particle_type: usize,
    particle_filtering: bool,
}

impl Default for MipSettings {
    fn default() -> Self {
        Self {
            scalar_mode: ScalarMode::Default,
            array_access: ArrayAccess::default(),
            array_component: None,
            use_lookup_table_scalar_range: true,
            scalar_range: [0.0, 1.0],
            type_scalars: None,
            active_scalars: None,
            particle_types: ParticleTypeTable::default(),
            active_particle_type: 0,
            particle_filtering: false,
        }
    }
}

impl MipSettings {
    pub fn set_scalar_mode(&mut self, mode: ScalarMode) {
        self.scalar_mode = mode;
    }

    pub fn set_array_id(&mut self, id: usize) {
        self.array_access = ArrayAccess::ById(id);
    }

    pub fn set_array_name(&mut self, name: impl Into<String>) {
        self.array_access = ArrayAccess::ByName(name.into());
    }

    pub fn set_array_component(&mut self, component: Option<usize>) {
        self.array_component = component;
    }

    /// Forces `[lo, hi]` as the colour range instead of the transfer
    /// function's own.
    pub fn set_scalar_range(&mut self, lo: f64, hi: f64) {
        self.scalar_range = [lo, hi];
        self.use_lookup_table_scalar_range = false;
    }

    pub fn set_use_lookup_table_scalar_range(&mut self, on: bool) {
        self.use_lookup_table_scalar_range = on;
    }

    /// The range to impose on the transfer function, if any.
    pub fn range_override(&self) -> Option<[f64; 2]> {
        (!self.use_lookup_table_scalar_range).then_some(self.scalar_range)
    }

    pub fn set_type_scalars(&mut self, name: Option<String>) {
        self.type_scalars = name;
    }

    pub fn set_active_scalars(&mut self, name: Option<String>) {
        self.active_scalars = name;
    }

    /// Grows the particle-type table; never shrinks it.
    pub fn set_number_of_particle_types(&mut self, n: usize) {
        self.particle_types.ensure(n);
    }

    pub fn number_of_particle_types(&self) -> usize {
        self.particle_types.len()
    }

    pub fn set_type_active(&mut self, ptype: usize, active: bool) {
        self.particle_types.set_active(ptype, active);
    }

    pub fn type_active(&self, ptype: usize) -> bool {
        self.particle_types.is_active(ptype)
    }

    /// Selects the type that [`Self::set_active_type_enabled`] acts on,
    /// allocating table space for it.
    pub fn set_active_particle_type(&mut self, ptype: usize) {
        self.particle_types.ensure(ptype + 1);
        self.active_particle_type = ptype;
    }

    pub fn active_particle_type(&self) -> usize {
        self.active_particle_type
    }

    pub fn set_active_type_enabled(&mut self, active: bool) {
        self.set_type_active(self.active_particle_type, active);
    }

    pub fn active_type_enabled(&self) -> bool {
        self.type_active(self.active_particle_type)
    }

    pub fn particle_types(&self) -> &ParticleTypeTable {
        &self.particle_types
    }

    /// Turns per-point type/active filtering on or off (off by default:
    /// every point is rendered).
    pub fn set_particle_filtering(&mut self, on: bool) {
        self.particle_filtering = on;
    }

    pub fn particle_filtering(&self) -> bool {
        self.particle_filtering
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_table_only_grows() {
        let mut s = MipSettings::default();
        assert_eq!(s.number_of_particle_types(), 1);
        s.set_number_of_particle_types(4);
        s.set_number_of_particle_types(2);
        assert_eq!(s.number_of_particle_types(), 4);
    }

    #[test]
    fn setting_high_type_grows_table() {
        let mut s = MipSettings::default();
        s.set_type_active(6, false);
        assert_eq!(s.number_of_particle_types(), 7);
        assert!(!s.type_active(6));
        assert!(s.type_active(5));
        assert!(!s.type_active(100));
    }

    #[test]
    fn active_particle_type_selects_entry() {
        let mut s = MipSettings::default();
        s.set_active_particle_type(3);
        assert_eq!(s.number_of_particle_types(), 4);
        s.set_active_type_enabled(false);
        assert!(!s.type_active(3));
        assert!(!s.active_type_enabled());
        assert!(s.type_active(0));
    }

    #[test]
    fn out_of_range_types_clamp_to_zero() {
        let mut t = ParticleTypeTable::default();
        t.ensure(3);
        assert_eq!(t.clamp_type(2.0), 2);
        assert_eq!(t.clamp_type(3.0), 0);
        assert_eq!(t.clamp_type(-1.0), 0);
        assert_eq!(t.clamp_type(f64::NAN), 0);
    }

    #[test]
    fn explicit_range_disables_lookup_table_range() {
        let mut s = MipSettings::default();
        assert_eq!(s.range_override(), None);
        s.set_scalar_range(2.0, 8.0);
        assert_eq!(s.range_override(), Some([2.0, 8.0]));
        s.set_use_lookup_table_scalar_range(true);
        assert_eq!(s.range_override(), None);
    }
}
