//! Metadata (`Info`), the opaque grid value, and the numeric payload
//! (`Value`) exchanged between slots.

use std::collections::BTreeMap;

use crate::error::CouplingError;

/// A scalar metadata value. `units` is the only key the runtime itself ever
/// inspects; everything else is opaque and only checked for equality.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Str(String),
    Float(f64),
    Int(i64),
}

/// Spatial specification of a grid. Opaque beyond value equality.
#[derive(Debug, Clone, PartialEq)]
pub enum GridSpec {
    /// No spatial structure (scalar exchange).
    NoGrid,
    /// A uniform rectilinear grid.
    Uniform { dims: Vec<usize>, spacing: Vec<f64> },
}

impl GridSpec {
    pub fn len(&self) -> usize {
        match self {
            GridSpec::NoGrid => 1,
            GridSpec::Uniform { dims, .. } => dims.iter().product(),
        }
    }
}

/// A dense grid payload: its spec plus the numeric data.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub spec: GridSpec,
    pub data: Vec<f64>,
}

impl Grid {
    pub fn new(spec: GridSpec, data: Vec<f64>) -> Self {
        Grid { spec, data }
    }

    fn elementwise(
        &self,
        other: &Grid,
        slot: &str,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Grid, CouplingError> {
        if self.spec != other.spec {
            return Err(CouplingError::Metadata {
                slot: slot.to_string(),
                detail: "grids with mismatched specs cannot be combined".to_string(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| f(*a, *b))
            .collect();
        Ok(Grid::new(self.spec.clone(), data))
    }
}

/// The canonical payload exchanged between slots: a bare scalar, or a grid.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Grid(Grid),
}

impl Value {
    /// Linear interpolation between `self` and `other` at fraction `frac`
    /// (0 = self, 1 = other).
    pub fn lerp(&self, other: &Value, frac: f64, slot: &str) -> Result<Value, CouplingError> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a + (b - a) * frac)),
            (Value::Grid(a), Value::Grid(b)) => {
                Ok(Value::Grid(a.elementwise(b, slot, |x, y| x + (y - x) * frac)?))
            }
            _ => Err(CouplingError::Metadata {
                slot: slot.to_string(),
                detail: "cannot interpolate values of mismatched shape".to_string(),
            }),
        }
    }

    /// `self + other`, used while accumulating trapezoid-rule segments.
    pub fn add(&self, other: &Value, slot: &str) -> Result<Value, CouplingError> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(a + b)),
            (Value::Grid(a), Value::Grid(b)) => Ok(Value::Grid(a.elementwise(b, slot, |x, y| x + y)?)),
            _ => Err(CouplingError::Metadata {
                slot: slot.to_string(),
                detail: "cannot add values of mismatched shape".to_string(),
            }),
        }
    }

    pub fn scale(&self, factor: f64) -> Value {
        match self {
            Value::Scalar(a) => Value::Scalar(a * factor),
            Value::Grid(g) => Value::Grid(Grid::new(
                g.spec.clone(),
                g.data.iter().map(|x| x * factor).collect(),
            )),
        }
    }

    /// Reduce a grid to a scalar, for the grid-reduction adapter.
    pub fn reduce_mean(&self, slot: &str) -> Result<Value, CouplingError> {
        match self {
            Value::Grid(g) if !g.data.is_empty() => {
                Ok(Value::Scalar(g.data.iter().sum::<f64>() / g.data.len() as f64))
            }
            Value::Grid(_) => Err(CouplingError::NoData {
                slot: slot.to_string(),
                detail: "cannot reduce an empty grid".to_string(),
            }),
            Value::Scalar(_) => Err(CouplingError::Metadata {
                slot: slot.to_string(),
                detail: "grid-reduction adapter requires a grid upstream".to_string(),
            }),
        }
    }

    pub fn reduce_sum(&self, slot: &str) -> Result<Value, CouplingError> {
        match self {
            Value::Grid(g) => Ok(Value::Scalar(g.data.iter().sum())),
            Value::Scalar(_) => Err(CouplingError::Metadata {
                slot: slot.to_string(),
                detail: "grid-reduction adapter requires a grid upstream".to_string(),
            }),
        }
    }
}

/// Metadata record carrying a grid spec and arbitrary scalar properties.
///
/// `None` fields are placeholders to be filled during the handshake: a
/// producer that doesn't know its own units yet, or a consumer that accepts
/// whatever the producer offers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Info {
    pub grid: Option<GridSpec>,
    pub meta: BTreeMap<String, MetaValue>,
}

impl Info {
    pub fn new(grid: Option<GridSpec>) -> Self {
        Info {
            grid,
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: MetaValue) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    pub fn units(&self) -> Option<&str> {
        match self.meta.get("units") {
            Some(MetaValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Two infos are compatible iff grids are equal and every shared meta
    /// key has an equal value. `None` fields on either side are treated as
    /// wildcards during the compatibility check.
    pub fn compatible_with(&self, other: &Info) -> bool {
        if let (Some(a), Some(b)) = (&self.grid, &other.grid) {
            if a != b {
                return false;
            }
        }
        for (k, v) in &self.meta {
            if let Some(ov) = other.meta.get(k) {
                if ov != v {
                    return false;
                }
            }
        }
        true
    }

    /// Merge `other` into `self`, filling only fields that are currently
    /// unset. Used after a handshake reply is accepted.
    pub fn merge_missing(&mut self, other: &Info) {
        if self.grid.is_none() {
            self.grid = other.grid.clone();
        }
        for (k, v) in &other.meta {
            self.meta.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }

    pub fn is_complete(&self) -> bool {
        self.grid.is_some()
    }
}
