use crate::types::{AerosolError, AerosolResult};
use ndarray::ArrayD;
use num_traits::Float;

/// Upper bound on table dimensionality; keeps per-query state on the stack
pub const MAX_DIMS: usize = 12;

/// Linear blend between `a` and `b` with weight `w` toward `b`
#[inline]
pub fn lerp<T: Float>(a: T, b: T, w: T) -> T {
    if w == T::zero() {
        a
    } else if w == T::one() {
        b
    } else {
        a * (T::one() - w) + b * w
    }
}

/// Ordered coordinate axis of a lookup table
///
/// Values are strictly increasing or strictly decreasing but need not be
/// evenly spaced. A single-value axis is degenerate and never contributes
/// an interpolation weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    values: Vec<f64>,
    descending: bool,
}

impl Axis {
    pub fn new(values: Vec<f64>) -> AerosolResult<Self> {
        if values.is_empty() {
            return Err(AerosolError::Configuration(
                "Axis must contain at least one value".to_string(),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(AerosolError::Configuration(
                "Axis contains non-finite values".to_string(),
            ));
        }

        let descending = values.len() > 1 && values[1] < values[0];
        let monotonic = values.windows(2).all(|pair| {
            if descending {
                pair[1] < pair[0]
            } else {
                pair[1] > pair[0]
            }
        });
        if !monotonic {
            return Err(AerosolError::Configuration(format!(
                "Axis of length {} is not strictly monotonic",
                values.len()
            )));
        }

        Ok(Self { values, descending })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_degenerate(&self) -> bool {
        self.values.len() == 1
    }

    pub fn is_descending(&self) -> bool {
        self.descending
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn first(&self) -> f64 {
        self.values[0]
    }

    pub fn last(&self) -> f64 {
        self.values[self.values.len() - 1]
    }

    /// Locate the bracketing interval for `q`
    ///
    /// Returns the lower node index `i` and the fractional weight toward
    /// node `i + 1`. Queries outside the axis saturate the weight of the
    /// boundary interval at 0 or 1. A NaN query yields a NaN weight.
    pub fn locate(&self, q: f64) -> (usize, f64) {
        let n = self.values.len();
        if n == 1 {
            return (0, 0.0);
        }
        if q.is_nan() {
            return (0, f64::NAN);
        }

        let v = &self.values;
        let lower = if self.descending {
            if q >= v[0] {
                return (0, 0.0);
            }
            if q <= v[n - 1] {
                return (n - 2, 1.0);
            }
            v.partition_point(|&x| x >= q) - 1
        } else {
            if q <= v[0] {
                return (0, 0.0);
            }
            if q >= v[n - 1] {
                return (n - 2, 1.0);
            }
            v.partition_point(|&x| x <= q) - 1
        };

        let lower = lower.min(n - 2);
        let w = (q - v[lower]) / (v[lower + 1] - v[lower]);
        (lower, w.clamp(0.0, 1.0))
    }

    /// Piecewise-linear interpolation of `ys` sampled on this axis
    pub fn interpolate(&self, ys: &[f64], q: f64) -> f64 {
        debug_assert_eq!(ys.len(), self.values.len());
        let (i, w) = self.locate(q);
        if self.is_degenerate() {
            ys[0]
        } else {
            lerp(ys[i], ys[i + 1], w)
        }
    }
}

/// N-dimensional lookup table with multilinear interpolation
///
/// Values are flattened row-major: the last axis varies fastest.
#[derive(Debug, Clone)]
pub struct LookupTable {
    axes: Vec<Axis>,
    values: Vec<f64>,
    strides: Vec<usize>,
}

impl LookupTable {
    pub fn new(axes: Vec<Axis>, values: Vec<f64>) -> AerosolResult<Self> {
        if axes.is_empty() {
            return Err(AerosolError::Configuration(
                "Lookup table needs at least one axis".to_string(),
            ));
        }
        if axes.len() > MAX_DIMS {
            return Err(AerosolError::Configuration(format!(
                "Lookup table has {} axes, at most {} are supported",
                axes.len(),
                MAX_DIMS
            )));
        }

        let expected: usize = axes.iter().map(Axis::len).product();
        if values.len() != expected {
            return Err(AerosolError::Configuration(format!(
                "Lookup table has {} values but axes {:?} require {}",
                values.len(),
                axes.iter().map(Axis::len).collect::<Vec<_>>(),
                expected
            )));
        }

        let mut strides = vec![1usize; axes.len()];
        for d in (0..axes.len() - 1).rev() {
            strides[d] = strides[d + 1] * axes[d + 1].len();
        }

        Ok(Self {
            axes,
            values,
            strides,
        })
    }

    /// Build a table from an n-dimensional array whose shape matches the axes
    pub fn from_array(axes: Vec<Axis>, array: &ArrayD<f64>) -> AerosolResult<Self> {
        let shape: Vec<usize> = axes.iter().map(Axis::len).collect();
        if array.shape() != shape.as_slice() {
            return Err(AerosolError::Configuration(format!(
                "Array shape {:?} does not match axis lengths {:?}",
                array.shape(),
                shape
            )));
        }
        // iter() walks in logical (row-major) order regardless of memory layout
        Self::new(axes, array.iter().copied().collect())
    }

    pub fn ndim(&self) -> usize {
        self.axes.len()
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn axis(&self, dim: usize) -> &Axis {
        &self.axes[dim]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value stored at a grid node
    pub fn node(&self, index: &[usize]) -> f64 {
        let offset: usize = index
            .iter()
            .zip(&self.strides)
            .map(|(i, stride)| i * stride)
            .sum();
        self.values[offset]
    }

    /// Multilinear interpolation at `coords` (one coordinate per axis)
    pub fn evaluate(&self, coords: &[f64]) -> AerosolResult<f64> {
        if coords.len() != self.axes.len() {
            return Err(AerosolError::Configuration(format!(
                "Expected {} coordinates, got {}",
                self.axes.len(),
                coords.len()
            )));
        }
        Ok(self.interpolate(coords))
    }

    /// Interpolation kernel; `coords.len()` must equal `ndim()`
    pub(crate) fn interpolate(&self, coords: &[f64]) -> f64 {
        if self.values.len() == 1 {
            return self.values[0];
        }

        let mut base = 0usize;
        let mut active_strides = [0usize; MAX_DIMS];
        let mut active_weights = [0.0f64; MAX_DIMS];
        let mut active = 0usize;

        for (d, axis) in self.axes.iter().enumerate() {
            let (lower, w) = axis.locate(coords[d]);
            base += lower * self.strides[d];
            if !axis.is_degenerate() {
                active_strides[active] = self.strides[d];
                active_weights[active] = w;
                active += 1;
            }
        }

        self.corner_sum(base, &active_strides[..active], &active_weights[..active])
    }

    /// Weighted sum over the 2^k corners of the enclosing hyper-cube
    fn corner_sum(&self, base: usize, strides: &[usize], weights: &[f64]) -> f64 {
        let mut sum = 0.0;
        for corner in 0..(1usize << strides.len()) {
            let mut weight = 1.0;
            let mut offset = base;
            for (k, (&stride, &w)) in strides.iter().zip(weights).enumerate() {
                if corner & (1 << k) != 0 {
                    weight *= w;
                    offset += stride;
                } else {
                    weight *= 1.0 - w;
                }
            }
            // zero-weight corners are skipped so grid-node queries stay exact
            if weight != 0.0 {
                sum += weight * self.values[offset];
            }
        }
        sum
    }

    /// Collapse the axes given a fixed coordinate by interpolating along them
    ///
    /// `fixed[d] = Some(q)` pins axis `d` at `q`; `None` keeps the axis. The
    /// result is a lower-dimensional table over the kept axes, evaluated at
    /// every kept grid node.
    pub fn subsection(&self, fixed: &[Option<f64>]) -> AerosolResult<LookupTable> {
        if fixed.len() != self.axes.len() {
            return Err(AerosolError::Configuration(format!(
                "Subsection needs {} axis entries, got {}",
                self.axes.len(),
                fixed.len()
            )));
        }

        let kept: Vec<usize> = (0..self.axes.len()).filter(|&d| fixed[d].is_none()).collect();
        if kept.is_empty() {
            return Err(AerosolError::Configuration(
                "Subsection must keep at least one axis".to_string(),
            ));
        }

        let mut base = 0usize;
        let mut fixed_strides = [0usize; MAX_DIMS];
        let mut fixed_weights = [0.0f64; MAX_DIMS];
        let mut n_fixed = 0usize;
        for (d, q) in fixed.iter().enumerate() {
            if let Some(q) = q {
                let axis = &self.axes[d];
                let (lower, w) = axis.locate(*q);
                base += lower * self.strides[d];
                if !axis.is_degenerate() {
                    fixed_strides[n_fixed] = self.strides[d];
                    fixed_weights[n_fixed] = w;
                    n_fixed += 1;
                }
            }
        }

        let kept_axes: Vec<Axis> = kept.iter().map(|&d| self.axes[d].clone()).collect();
        let total: usize = kept_axes.iter().map(Axis::len).product();
        let mut values = Vec::with_capacity(total);
        let mut index = vec![0usize; kept.len()];

        for _ in 0..total {
            let offset: usize = base
                + kept
                    .iter()
                    .zip(&index)
                    .map(|(&d, &i)| i * self.strides[d])
                    .sum::<usize>();
            values.push(self.corner_sum(
                offset,
                &fixed_strides[..n_fixed],
                &fixed_weights[..n_fixed],
            ));

            // row-major increment over the kept axes
            for k in (0..kept.len()).rev() {
                index[k] += 1;
                if index[k] < kept_axes[k].len() {
                    break;
                }
                index[k] = 0;
            }
        }

        LookupTable::new(kept_axes, values)
    }
}
