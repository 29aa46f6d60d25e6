//! Named attribute arrays and their typed accessors.

/// Typed storage for a [`DataArray`]. Values are tuple-interleaved:
/// tuple `i`, component `c` lives at `i * components + c`.
#[derive(Debug, Clone)]
pub enum ArrayValues {
    F32(Vec<f32>),
    F64(Vec<f64>),
    I32(Vec<i32>),
    U8(Vec<u8>),
}

impl ArrayValues {
    #[inline]
    fn len(&self) -> usize {
        match self {
            ArrayValues::F32(v) => v.len(),
            ArrayValues::F64(v) => v.len(),
            ArrayValues::I32(v) => v.len(),
            ArrayValues::U8(v) => v.len(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ArrayValues::F32(_) => "f32",
            ArrayValues::F64(_) => "f64",
            ArrayValues::I32(_) => "i32",
            ArrayValues::U8(_) => "u8",
        }
    }
}

/// A named array of `tuples * components` numeric values.
#[derive(Debug, Clone)]
pub struct DataArray {
    name: String,
    components: usize,
    values: ArrayValues,
}

/// Read-only view over the values of a floating-point array.
///
/// Resolved once per render so the hot loop never re-inspects the storage
/// type of the array.
#[derive(Debug, Clone, Copy)]
pub enum Samples<'a> {
    F32(&'a [f32]),
    F64(&'a [f64]),
}

impl Samples<'_> {
    #[inline(always)]
    pub fn get(&self, index: usize) -> f64 {
        match self {
            Samples::F32(v) => v[index] as f64,
            Samples::F64(v) => v[index],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            Samples::F32(v) => v.len(),
            Samples::F64(v) => v.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DataArray {
    /// Creates an array. A component count of zero is treated as one.
    pub fn new(name: impl Into<String>, components: usize, values: ArrayValues) -> Self {
        Self {
            name: name.into(),
            components: components.max(1),
            values,
        }
    }

    pub fn from_f32(name: impl Into<String>, components: usize, values: Vec<f32>) -> Self {
        Self::new(name, components, ArrayValues::F32(values))
    }

    pub fn from_f64(name: impl Into<String>, components: usize, values: Vec<f64>) -> Self {
        Self::new(name, components, ArrayValues::F64(values))
    }

    pub fn from_i32(name: impl Into<String>, components: usize, values: Vec<i32>) -> Self {
        Self::new(name, components, ArrayValues::I32(values))
    }

    pub fn from_u8(name: impl Into<String>, components: usize, values: Vec<u8>) -> Self {
        Self::new(name, components, ArrayValues::U8(values))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn components(&self) -> usize {
        self.components
    }

    /// Number of complete tuples in the array.
    #[inline]
    pub fn tuples(&self) -> usize {
        self.values.len() / self.components
    }

    /// Storage type name, for diagnostics.
    #[inline]
    pub fn kind(&self) -> &'static str {
        self.values.kind()
    }

    #[inline]
    pub fn values(&self) -> &ArrayValues {
        &self.values
    }

    /// Floating-point view of the values, or `None` for integer arrays.
    pub fn samples(&self) -> Option<Samples<'_>> {
        match &self.values {
            ArrayValues::F32(v) => Some(Samples::F32(v)),
            ArrayValues::F64(v) => Some(Samples::F64(v)),
            ArrayValues::I32(_) | ArrayValues::U8(_) => None,
        }
    }

    /// Reads one component of one tuple as a double, whatever the storage type.
    #[inline]
    pub fn component(&self, tuple: usize, component: usize) -> f64 {
        let i = tuple * self.components + component;
        match &self.values {
            ArrayValues::F32(v) => v[i] as f64,
            ArrayValues::F64(v) => v[i],
            ArrayValues::I32(v) => v[i] as f64,
            ArrayValues::U8(v) => v[i] as f64,
        }
    }
}

/// An ordered collection of arrays attached to points or cells, with an
/// optional designated "active scalars" array.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    arrays: Vec<DataArray>,
    active_scalars: Option<usize>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an array, replacing any existing array with the same name.
    /// Returns the array's index.
    pub fn add_array(&mut self, array: DataArray) -> usize {
        if let Some(i) = self.index_of(array.name()) {
            self.arrays[i] = array;
            i
        } else {
            self.arrays.push(array);
            self.arrays.len() - 1
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&DataArray> {
        self.arrays.get(index)
    }

    pub fn by_name(&self, name: &str) -> Option<&DataArray> {
        self.index_of(name).map(|i| &self.arrays[i])
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.arrays.iter().position(|a| a.name() == name)
    }

    /// Marks the named array as the active scalars. Returns `false` (and
    /// leaves the selection unchanged) if no such array exists.
    pub fn set_active_scalars(&mut self, name: &str) -> bool {
        match self.index_of(name) {
            Some(i) => {
                self.active_scalars = Some(i);
                true
            }
            None => false,
        }
    }

    pub fn scalars(&self) -> Option<&DataArray> {
        self.active_scalars.and_then(|i| self.arrays.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataArray> {
        self.arrays.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arrays_have_no_float_view() {
        let ints = DataArray::from_i32("type", 1, vec![0, 1, 2]);
        assert!(ints.samples().is_none());
        assert_eq!(ints.component(2, 0), 2.0);

        let floats = DataArray::from_f32("density", 1, vec![0.5, 1.5]);
        let s = floats.samples().unwrap();
        assert_eq!(s.get(1), 1.5);
    }

    #[test]
    fn tuples_account_for_components() {
        let v = DataArray::from_f64("velocity", 3, vec![0.0; 12]);
        assert_eq!(v.tuples(), 4);
        assert_eq!(v.components(), 3);
    }

    #[test]
    fn adding_same_name_replaces_array() {
        let mut attrs = Attributes::new();
        attrs.add_array(DataArray::from_f32("rho", 1, vec![1.0]));
        let i = attrs.add_array(DataArray::from_f32("rho", 1, vec![2.0, 3.0]));
        assert_eq!(i, 0);
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get(0).unwrap().tuples(), 2);
    }

    #[test]
    fn active_scalars_requires_existing_array() {
        let mut attrs = Attributes::new();
        attrs.add_array(DataArray::from_f32("rho", 1, vec![1.0]));
        assert!(!attrs.set_active_scalars("temperature"));
        assert!(attrs.scalars().is_none());
        assert!(attrs.set_active_scalars("rho"));
        assert_eq!(attrs.scalars().unwrap().name(), "rho");
    }
}
