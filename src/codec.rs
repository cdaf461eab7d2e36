//! Bounded-parameter encoding between raw optimizer space and physical units.
//!
//! Optimizers work in a unit-free raw space where every component nominally
//! lives in `[-RAW_BOUND, +RAW_BOUND]`. The codec maps named regions of a raw
//! vector onto physically bounded parameters, either affinely (linear slots)
//! or affinely in log space (exponential slots, for parameters spanning
//! orders of magnitude such as opacities or ring densities).
//!
//! Decoding saturates at the bounds, so an optimizer that wanders out of
//! range would otherwise feel a flat landscape there. [`ParameterCodec::extra_error`]
//! computes a soft penalty from the *unclamped* raw values to restore a
//! useful signal for over-range excursions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Result, UmbrafitError};

/// Half-width of the canonical raw range; raw components are conceptually
/// clamped to `[-RAW_BOUND, +RAW_BOUND]` before decoding.
pub const RAW_BOUND: f64 = 1.733;

/// Decode rule for a registered slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum ScaleKind {
    /// Affine map from the raw range onto `[min, max]`.
    Linear,
    /// Affine map in `[ln min, ln max]`, then exponentiated.
    Exponential,
}

/// A named region of the raw vector with its decode rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Slot {
    offset: usize,
    count: usize,
    min: f64,
    max: f64,
    kind: ScaleKind,
}

impl Slot {
    fn decode_component(&self, raw: f64) -> f64 {
        let clamped = raw.clamp(-RAW_BOUND, RAW_BOUND);
        let t = (clamped + RAW_BOUND) / (2.0 * RAW_BOUND);
        match self.kind {
            ScaleKind::Linear => self.min + t * (self.max - self.min),
            ScaleKind::Exponential => {
                let (lo, hi) = (self.min.ln(), self.max.ln());
                (lo + t * (hi - lo)).exp()
            }
        }
    }
}

/// Registry mapping named, bounded parameters onto a fixed-length raw vector.
///
/// Slots occupy contiguous raw components in registration order;
/// re-registering a name is an error.
///
/// # Examples
///
/// ```
/// use umbrafit::codec::{ParameterCodec, RAW_BOUND};
///
/// let mut codec = ParameterCodec::new();
/// codec.add_linear("disk_radius", 0.1, 2.0).expect("fresh id");
/// codec.add_exponential("opacity", 1e-3, 1.0).expect("fresh id");
///
/// let raw = vec![RAW_BOUND, 0.0];
/// assert!((codec.decode("disk_radius", &raw).unwrap() - 2.0).abs() < 1e-12);
/// // Exponential midpoint is the geometric mean of the bounds.
/// let mid = codec.decode("opacity", &raw).unwrap();
/// assert!((mid - (1e-3f64).sqrt()).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterCodec {
    names: Vec<String>,
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    dimension: usize,
}

impl ParameterCodec {
    /// Creates an empty codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a single linear scalar decoded onto `[min, max]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is already registered or the bounds are
    /// non-finite or inverted.
    pub fn add_linear(&mut self, id: &str, min: f64, max: f64) -> Result<()> {
        self.register(id, 1, min, max, ScaleKind::Linear)
    }

    /// Registers a single exponential scalar decoded onto `[min, max]` in
    /// log space.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is already registered, the bounds are
    /// non-finite or inverted, or either bound is non-positive.
    pub fn add_exponential(&mut self, id: &str, min: f64, max: f64) -> Result<()> {
        if min <= 0.0 || max <= 0.0 {
            return Err(UmbrafitError::InvalidBounds {
                id: id.to_string(),
                min,
                max,
                constraint: "exponential bounds must be positive".to_string(),
            });
        }
        self.register(id, 1, min, max, ScaleKind::Exponential)
    }

    /// Registers a vector slot of `count` independent linear scalars sharing
    /// the same bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is already registered, `count` is zero, or
    /// the bounds are non-finite or inverted.
    pub fn add_multi(&mut self, id: &str, count: usize, min: f64, max: f64) -> Result<()> {
        if count == 0 {
            return Err(UmbrafitError::InvalidHyperparameter {
                param: "count".to_string(),
                value: "0".to_string(),
                constraint: "count >= 1".to_string(),
            });
        }
        self.register(id, count, min, max, ScaleKind::Linear)
    }

    fn register(&mut self, id: &str, count: usize, min: f64, max: f64, kind: ScaleKind) -> Result<()> {
        if self.index.contains_key(id) {
            return Err(UmbrafitError::DuplicateParameter { id: id.to_string() });
        }
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(UmbrafitError::InvalidBounds {
                id: id.to_string(),
                min,
                max,
                constraint: "finite bounds with min < max".to_string(),
            });
        }
        let slot = Slot {
            offset: self.dimension,
            count,
            min,
            max,
            kind,
        };
        self.index.insert(id.to_string(), self.slots.len());
        self.names.push(id.to_string());
        self.dimension += count;
        self.slots.push(slot);
        Ok(())
    }

    /// Decodes the first (for scalar slots, the only) component of a slot.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is unregistered or `raw` is shorter than the
    /// slot's region.
    pub fn decode(&self, id: &str, raw: &[f64]) -> Result<f64> {
        let slot = self.slot(id, raw)?;
        Ok(slot.decode_component(raw[slot.offset]))
    }

    /// Decodes every component of a slot.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is unregistered or `raw` is shorter than the
    /// slot's region.
    pub fn decode_all(&self, id: &str, raw: &[f64]) -> Result<Vec<f64>> {
        let slot = self.slot(id, raw)?;
        Ok(raw[slot.offset..slot.offset + slot.count]
            .iter()
            .map(|&v| slot.decode_component(v))
            .collect())
    }

    /// Soft penalty for raw components outside the canonical range.
    ///
    /// Sums the squared excursion of every registered component beyond
    /// `[-RAW_BOUND, RAW_BOUND]`, normalized by the registered component
    /// count and scaled by `lambda`. Exactly zero when all components are in
    /// range. Computed from the unclamped raw values so the term keeps
    /// growing where the saturated decode stops changing.
    #[must_use]
    pub fn extra_error(&self, raw: &[f64], lambda: f64) -> f64 {
        if self.dimension == 0 {
            return 0.0;
        }
        let mut sum = 0.0;
        for slot in &self.slots {
            for i in slot.offset..(slot.offset + slot.count).min(raw.len()) {
                let excess = raw[i].abs() - RAW_BOUND;
                if excess > 0.0 {
                    sum += excess * excess;
                }
            }
        }
        lambda * sum / self.dimension as f64
    }

    /// Total number of raw components registered across all slots.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Registered slot names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of raw components occupied by a slot.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is unregistered.
    pub fn slot_len(&self, id: &str) -> Result<usize> {
        let idx = self
            .index
            .get(id)
            .ok_or_else(|| UmbrafitError::UnknownParameter { id: id.to_string() })?;
        Ok(self.slots[*idx].count)
    }

    fn slot(&self, id: &str, raw: &[f64]) -> Result<&Slot> {
        let idx = self
            .index
            .get(id)
            .ok_or_else(|| UmbrafitError::UnknownParameter { id: id.to_string() })?;
        let slot = &self.slots[*idx];
        if raw.len() < slot.offset + slot.count {
            return Err(UmbrafitError::DimensionMismatch {
                expected: format!(">= {} components", slot.offset + slot.count),
                actual: raw.len().to_string(),
            });
        }
        Ok(slot)
    }
}
