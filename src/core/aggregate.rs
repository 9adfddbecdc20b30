use crate::types::{AerosolError, AerosolResult, RetrievalFlags};

/// Read access to one rectangular block of co-registered input samples
pub trait PixelBlock {
    /// Block size as (rows, cols)
    fn dim(&self) -> (usize, usize);

    /// Number of co-registered fields per pixel
    fn field_count(&self) -> usize;

    /// Sample of `field` at column `x`, row `y`
    fn sample(&self, field: usize, x: usize, y: usize) -> f64;

    /// Upstream land/cloud/invalid screening for the pixel
    fn is_valid(&self, x: usize, y: usize) -> bool;

    /// Surface classification bits (LAND, CLOUD, BORDER) of the pixel
    fn surface_flags(&self, _x: usize, _y: usize) -> RetrievalFlags {
        RetrievalFlags::empty()
    }
}

/// Unit convention of an input field, fixed when the layout is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AngleConvention {
    #[default]
    AsIs,
    /// Field holds an elevation angle; averaged as zenith = 90° − value
    ElevationToZenith,
}

/// One quantity to average: which block field and how to normalise it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: usize,
    pub convention: AngleConvention,
}

impl FieldSpec {
    pub fn new(field: usize) -> Self {
        Self {
            field,
            convention: AngleConvention::AsIs,
        }
    }

    pub fn elevation(field: usize) -> Self {
        Self {
            field,
            convention: AngleConvention::ElevationToZenith,
        }
    }

    #[inline]
    fn normalise(&self, value: f64) -> f64 {
        match self.convention {
            AngleConvention::AsIs => value,
            AngleConvention::ElevationToZenith => 90.0 - value,
        }
    }
}

/// How many valid samples a window needs before its mean is trusted
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MinValidPolicy {
    /// n² − 1 samples, regardless of raster edges
    AllButOne,
    /// ceil(fraction · in-bounds window samples), shrinks at raster edges
    EdgeAdjusted { fraction: f64 },
}

impl MinValidPolicy {
    pub fn threshold(&self, window_samples: usize, in_bounds: usize) -> usize {
        match *self {
            MinValidPolicy::AllButOne => window_samples.saturating_sub(1).max(1),
            MinValidPolicy::EdgeAdjusted { fraction } => {
                ((fraction * in_bounds as f64).ceil() as usize).max(1)
            }
        }
    }
}

/// Averaged inputs for one output pixel
#[derive(Debug, Clone, PartialEq)]
pub struct WindowAverage {
    /// Mean per requested field, `None` below the valid-sample threshold
    pub means: Option<Vec<f64>>,
    pub valid_samples: usize,
    pub in_bounds_samples: usize,
    /// OR of the surface bits over the window, plus BORDER at raster edges
    pub flags: RetrievalFlags,
}

/// Averages valid input pixels over n×n windows centred on output pixels
#[derive(Debug, Clone)]
pub struct WindowedPixelAggregator {
    block_size: usize,
    no_data: f64,
    policy: MinValidPolicy,
}

impl WindowedPixelAggregator {
    pub fn new(block_size: usize, no_data: f64, policy: MinValidPolicy) -> AerosolResult<Self> {
        if block_size == 0 || block_size % 2 == 0 {
            return Err(AerosolError::Configuration(format!(
                "Average block size must be odd, got {}",
                block_size
            )));
        }
        Ok(Self {
            block_size,
            no_data,
            policy,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Output grid size (rows, cols) for an input block
    pub fn output_dim(&self, input: (usize, usize)) -> (usize, usize) {
        (
            (input.0 + self.block_size - 1) / self.block_size,
            (input.1 + self.block_size - 1) / self.block_size,
        )
    }

    /// Input pixel at the centre of output pixel (x, y)
    pub fn center(&self, out_x: usize, out_y: usize) -> (usize, usize) {
        let half = self.block_size / 2;
        (out_x * self.block_size + half, out_y * self.block_size + half)
    }

    #[inline]
    fn is_no_data(&self, value: f64) -> bool {
        !value.is_finite() || value == self.no_data
    }

    /// Mean of every field over the window of output pixel (out_x, out_y)
    ///
    /// A sample contributes only if the pixel is valid and none of the
    /// requested fields is no-data.
    pub fn aggregate<B: PixelBlock + ?Sized>(
        &self,
        block: &B,
        fields: &[FieldSpec],
        out_x: usize,
        out_y: usize,
    ) -> WindowAverage {
        let (rows, cols) = block.dim();
        let half = (self.block_size / 2) as isize;
        let (cx, cy) = self.center(out_x, out_y);

        let mut sums = vec![0.0f64; fields.len()];
        let mut values = vec![0.0f64; fields.len()];
        let mut valid = 0usize;
        let mut in_bounds = 0usize;
        let mut flags = RetrievalFlags::empty();

        for dy in -half..=half {
            for dx in -half..=half {
                let x = cx as isize + dx;
                let y = cy as isize + dy;
                if x < 0 || y < 0 || x >= cols as isize || y >= rows as isize {
                    flags.insert(RetrievalFlags::BORDER);
                    continue;
                }
                let (x, y) = (x as usize, y as usize);
                in_bounds += 1;
                flags |= block.surface_flags(x, y).intersection(RetrievalFlags::SURFACE);

                if !block.is_valid(x, y) {
                    continue;
                }

                let mut usable = true;
                for (value, spec) in values.iter_mut().zip(fields) {
                    let raw = block.sample(spec.field, x, y);
                    if self.is_no_data(raw) {
                        usable = false;
                        break;
                    }
                    *value = spec.normalise(raw);
                }
                if !usable {
                    continue;
                }

                for (sum, value) in sums.iter_mut().zip(&values) {
                    *sum += value;
                }
                valid += 1;
            }
        }

        let window_samples = self.block_size * self.block_size;
        let threshold = self.policy.threshold(window_samples, in_bounds);
        let means = if valid >= threshold && valid > 0 {
            Some(sums.iter().map(|s| s / valid as f64).collect())
        } else {
            None
        };

        if means.is_none() {
            flags.insert(RetrievalFlags::INSUFFICIENT_SAMPLES);
        }

        WindowAverage {
            means,
            valid_samples: valid,
            in_bounds_samples: in_bounds,
            flags,
        }
    }
}
