use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default value written into output bands for pixels without a retrieval
pub const DEFAULT_NO_DATA: f64 = -1.0;

/// Highest aerosol model id shipped with the LUT set
pub const MAX_MODEL_ID: u8 = 40;

/// Identifier of a candidate aerosol mixture (1..=40)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct AerosolModelId(u8);

impl AerosolModelId {
    /// Validate and wrap a raw model id
    pub fn new(id: u8) -> AerosolResult<Self> {
        if (1..=MAX_MODEL_ID).contains(&id) {
            Ok(Self(id))
        } else {
            Err(AerosolError::Configuration(format!(
                "Aerosol model id {} outside 1..={}",
                id, MAX_MODEL_ID
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Every model id in the LUT set, in ascending order
    pub fn all() -> impl Iterator<Item = AerosolModelId> {
        (1..=MAX_MODEL_ID).map(AerosolModelId)
    }
}

impl TryFrom<u8> for AerosolModelId {
    type Error = AerosolError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl From<AerosolModelId> for u8 {
    fn from(id: AerosolModelId) -> u8 {
        id.0
    }
}

impl fmt::Display for AerosolModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model {:02}", self.0)
    }
}

/// Instrument view a channel is observed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum View {
    Meris,
    AatsrNadir,
    AatsrForward,
}

impl View {
    pub const ALL: [View; 3] = [View::Meris, View::AatsrNadir, View::AatsrForward];

    pub fn index(self) -> usize {
        match self {
            View::Meris => 0,
            View::AatsrNadir => 1,
            View::AatsrForward => 2,
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Meris => write!(f, "MERIS"),
            View::AatsrNadir => write!(f, "AATSR_NADIR"),
            View::AatsrForward => write!(f, "AATSR_FWARD"),
        }
    }
}

impl FromStr for View {
    type Err = AerosolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "MERIS" => Ok(View::Meris),
            "AATSR_NADIR" | "NADIR" => Ok(View::AatsrNadir),
            "AATSR_FWARD" | "AATSR_FORWARD" | "FORWARD" => Ok(View::AatsrForward),
            other => Err(AerosolError::Configuration(format!("Unknown view: {}", other))),
        }
    }
}

impl TryFrom<String> for View {
    type Error = AerosolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<View> for String {
    fn from(view: View) -> String {
        view.to_string()
    }
}

/// Retrieval variant: selects which LUT family and search parameters apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SurfaceType {
    /// Wind speed is the surface axis, Ångström exponent is searched
    Ocean,
    /// Surface albedo is the surface axis, Ångström comes from the model
    Land,
}

impl fmt::Display for SurfaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceType::Ocean => write!(f, "ocean"),
            SurfaceType::Land => write!(f, "land"),
        }
    }
}

impl FromStr for SurfaceType {
    type Err = AerosolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ocean" | "water" => Ok(SurfaceType::Ocean),
            "land" => Ok(SurfaceType::Land),
            other => Err(AerosolError::Configuration(format!(
                "Unknown surface type: {}",
                other
            ))),
        }
    }
}

impl TryFrom<String> for SurfaceType {
    type Error = AerosolError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SurfaceType> for String {
    fn from(surface: SurfaceType) -> String {
        surface.to_string()
    }
}

bitflags! {
    /// Per-pixel quality and failure word
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RetrievalFlags: u32 {
        const SUCCESS = 1 << 0;
        const DEGENERATE_COST = 1 << 1;
        const TAU_TOO_LOW = 1 << 2;
        const RELATIVE_ERROR_TOO_HIGH = 1 << 3;
        const INSUFFICIENT_SAMPLES = 1 << 4;
        const LAND = 1 << 5;
        const CLOUD = 1 << 6;
        const BORDER = 1 << 7;
        /// Best fit sits on the edge of the search grid
        const BOUNDARY_SOLUTION = 1 << 8;
        const GLINT_RISK = 1 << 9;

        // composites come last so `iter_names` reports single bits
        /// Bits that mark a pixel as a failed retrieval
        const FAILURES = Self::DEGENERATE_COST.bits()
            | Self::TAU_TOO_LOW.bits()
            | Self::RELATIVE_ERROR_TOO_HIGH.bits()
            | Self::INSUFFICIENT_SAMPLES.bits();
        /// Bits aggregated from the input surface classification
        const SURFACE = Self::LAND.bits() | Self::CLOUD.bits() | Self::BORDER.bits();
    }
}

impl RetrievalFlags {
    /// Names of the set bits, lowest bit first
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

impl fmt::Display for RetrievalFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join("|"))
    }
}

/// Final per-pixel retrieval output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRetrievalResult {
    pub optical_thickness: f64, // τ at the reference wavelength (550 nm)
    pub angstrom_exponent: f64,
    pub tau_error: f64,
    pub angstrom_error: f64,
    pub fit_error: f64, // minimum weighted cost of the winning model
    pub wind_speed: f64, // m/s, ocean only
    pub glint_reflectance: f64,
    pub model_id: Option<AerosolModelId>,
    pub flags: RetrievalFlags,
}

impl PixelRetrievalResult {
    /// Result with every scalar output set to the no-data value
    pub fn no_data(no_data: f64, flags: RetrievalFlags) -> Self {
        Self {
            optical_thickness: no_data,
            angstrom_exponent: no_data,
            tau_error: no_data,
            angstrom_error: no_data,
            fit_error: no_data,
            wind_speed: no_data,
            glint_reflectance: no_data,
            model_id: None,
            flags,
        }
    }

    pub fn is_success(&self) -> bool {
        self.flags.contains(RetrievalFlags::SUCCESS)
    }
}

/// Error types for aerosol retrieval
#[derive(Debug, thiserror::Error)]
pub enum AerosolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("LUT error: {0}")]
    Lut(String),

    #[error("Aerosol model {0} was not preloaded")]
    ModelUnavailable(u8),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Retrieval cancelled")]
    Cancelled,
}

/// Result type for retrieval operations
pub type AerosolResult<T> = Result<T, AerosolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_names_skip_composites() {
        let flags = RetrievalFlags::TAU_TOO_LOW | RetrievalFlags::BORDER;
        assert_eq!(flags.names(), vec!["TAU_TOO_LOW", "BORDER"]);
        assert_eq!(flags.to_string(), "TAU_TOO_LOW|BORDER");
        assert_eq!(RetrievalFlags::FAILURES.names().len(), 4);
        assert!(RetrievalFlags::SURFACE.contains(RetrievalFlags::CLOUD));
    }

    #[test]
    fn test_unknown_bits_dropped() {
        let flags = RetrievalFlags::from_bits_truncate(RetrievalFlags::LAND.bits() | (1 << 20));
        assert_eq!(flags, RetrievalFlags::LAND);
        assert!(RetrievalFlags::from_bits(1 << 20).is_none());
    }

    #[test]
    fn test_model_id_range() {
        assert!(AerosolModelId::new(0).is_err());
        assert!(AerosolModelId::new(MAX_MODEL_ID + 1).is_err());
        assert_eq!(AerosolModelId::all().count(), MAX_MODEL_ID as usize);
    }
}
