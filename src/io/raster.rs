use crate::core::aggregate::PixelBlock;
use crate::core::retrieval::ResultSink;
use crate::types::{AerosolError, AerosolResult, PixelRetrievalResult, RetrievalFlags};
use ndarray::{Array2, Array3};

/// Co-registered input fields of one rectangular block, stored (field, row, col)
#[derive(Debug, Clone)]
pub struct RasterBlock {
    fields: Array3<f64>,
    valid: Array2<bool>,
    flags: Option<Array2<u32>>,
}

impl RasterBlock {
    pub fn new(fields: Array3<f64>, valid: Array2<bool>) -> AerosolResult<Self> {
        let (_, rows, cols) = fields.dim();
        if valid.dim() != (rows, cols) {
            return Err(AerosolError::Configuration(format!(
                "Validity mask {:?} does not match block size ({}, {})",
                valid.dim(),
                rows,
                cols
            )));
        }
        Ok(Self {
            fields,
            valid,
            flags: None,
        })
    }

    /// All pixels valid
    pub fn from_fields(fields: Array3<f64>) -> Self {
        let (_, rows, cols) = fields.dim();
        Self {
            fields,
            valid: Array2::from_elem((rows, cols), true),
            flags: None,
        }
    }

    /// Attach upstream surface classification bits (LAND, CLOUD, BORDER)
    pub fn with_surface_flags(mut self, flags: Array2<u32>) -> AerosolResult<Self> {
        if flags.dim() != self.valid.dim() {
            return Err(AerosolError::Configuration(format!(
                "Surface flag band {:?} does not match block size {:?}",
                flags.dim(),
                self.valid.dim()
            )));
        }
        self.flags = Some(flags);
        Ok(self)
    }

    pub fn fields(&self) -> &Array3<f64> {
        &self.fields
    }
}

impl PixelBlock for RasterBlock {
    fn dim(&self) -> (usize, usize) {
        self.valid.dim()
    }

    fn field_count(&self) -> usize {
        self.fields.dim().0
    }

    #[inline]
    fn sample(&self, field: usize, x: usize, y: usize) -> f64 {
        self.fields[[field, y, x]]
    }

    #[inline]
    fn is_valid(&self, x: usize, y: usize) -> bool {
        self.valid[[y, x]]
    }

    fn surface_flags(&self, x: usize, y: usize) -> RetrievalFlags {
        match &self.flags {
            Some(flags) => RetrievalFlags::from_bits_truncate(flags[[y, x]]),
            None => RetrievalFlags::empty(),
        }
    }
}

/// One band per scalar output, initialised to no-data
#[derive(Debug, Clone)]
pub struct OutputRasters {
    pub optical_thickness: Array2<f64>,
    pub angstrom_exponent: Array2<f64>,
    pub tau_error: Array2<f64>,
    pub angstrom_error: Array2<f64>,
    pub fit_error: Array2<f64>,
    pub wind_speed: Array2<f64>,
    pub glint_reflectance: Array2<f64>,
    /// 0 where no model was retained
    pub model_id: Array2<u8>,
    pub flags: Array2<u32>,
}

impl OutputRasters {
    pub fn new(rows: usize, cols: usize, no_data: f64) -> Self {
        let band = || Array2::from_elem((rows, cols), no_data);
        Self {
            optical_thickness: band(),
            angstrom_exponent: band(),
            tau_error: band(),
            angstrom_error: band(),
            fit_error: band(),
            wind_speed: band(),
            glint_reflectance: band(),
            model_id: Array2::zeros((rows, cols)),
            flags: Array2::zeros((rows, cols)),
        }
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.flags.dim()
    }
}

impl ResultSink for OutputRasters {
    fn write_result(&mut self, x: usize, y: usize, result: &PixelRetrievalResult) {
        let (rows, cols) = self.dim();
        if x >= cols || y >= rows {
            log::warn!("Result at ({}, {}) outside {}x{} output raster", x, y, cols, rows);
            return;
        }
        self.optical_thickness[[y, x]] = result.optical_thickness;
        self.angstrom_exponent[[y, x]] = result.angstrom_exponent;
        self.tau_error[[y, x]] = result.tau_error;
        self.angstrom_error[[y, x]] = result.angstrom_error;
        self.fit_error[[y, x]] = result.fit_error;
        self.wind_speed[[y, x]] = result.wind_speed;
        self.glint_reflectance[[y, x]] = result.glint_reflectance;
        self.model_id[[y, x]] = result.model_id.map_or(0, |m| m.get());
        self.flags[[y, x]] = result.flags.bits();
    }
}
