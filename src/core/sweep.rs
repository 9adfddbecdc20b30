use crate::types::{AerosolModelId, PixelRetrievalResult, RetrievalFlags};
use serde::{Deserialize, Serialize};

/// Best-fit parameters of one aerosol model at one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub tau: f64,
    pub tau_error: f64,
    pub angstrom: f64,
    pub angstrom_error: f64,
    /// Minimum weighted cost
    pub fit_error: f64,
    pub wind_speed: f64,
    pub on_boundary: bool,
}

impl Candidate {
    fn is_degenerate(&self) -> bool {
        !self.fit_error.is_finite() || self.fit_error < 0.0 || !self.tau_error.is_finite() || !self.tau.is_finite()
    }
}

/// Thresholds that turn a numerically valid fit into a failed retrieval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureThresholds {
    /// Fits below this optical thickness are not physical
    pub tau_floor: f64,
    /// Relative-error rule only applies above this optical thickness
    pub relative_error_min_tau: f64,
    /// Largest tolerated tau_error / tau
    pub max_relative_error: f64,
}

impl FailureThresholds {
    pub const OCEAN: Self = Self {
        tau_floor: 1e-5,
        relative_error_min_tau: 0.1,
        max_relative_error: 5.0,
    };

    pub const LAND: Self = Self {
        tau_floor: 1e-3,
        relative_error_min_tau: 0.1,
        max_relative_error: 5.0,
    };

    /// Failure bits for one candidate; `None` means the cost engine gave up
    pub fn classify(&self, candidate: Option<&Candidate>) -> RetrievalFlags {
        let candidate = match candidate {
            Some(c) if !c.is_degenerate() => c,
            _ => return RetrievalFlags::DEGENERATE_COST,
        };

        let mut flags = RetrievalFlags::empty();
        if candidate.tau < self.tau_floor {
            flags.insert(RetrievalFlags::TAU_TOO_LOW);
        }
        if candidate.tau > self.relative_error_min_tau
            && candidate.tau_error / candidate.tau > self.max_relative_error
        {
            flags.insert(RetrievalFlags::RELATIVE_ERROR_TOO_HIGH);
        }
        if candidate.on_boundary {
            flags.insert(RetrievalFlags::BOUNDARY_SOLUTION);
        }
        flags
    }
}

/// What happened to a candidate offered to the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BestSoFar,
    Discarded,
}

#[derive(Debug, Clone, Copy)]
enum SweepState {
    NoResult,
    BestSoFar {
        model: AerosolModelId,
        candidate: Candidate,
        flags: RetrievalFlags,
    },
}

/// Keeps the lowest-error aerosol model across a per-pixel model sweep
#[derive(Debug, Clone)]
pub struct ModelSweepController {
    thresholds: FailureThresholds,
    no_data: f64,
    state: SweepState,
    evaluated: usize,
    degenerate: usize,
}

impl ModelSweepController {
    pub fn new(thresholds: FailureThresholds, no_data: f64) -> Self {
        Self {
            thresholds,
            no_data,
            state: SweepState::NoResult,
            evaluated: 0,
            degenerate: 0,
        }
    }

    pub fn evaluated(&self) -> usize {
        self.evaluated
    }

    /// Candidates rejected because their fit was degenerate
    pub fn degenerate(&self) -> usize {
        self.degenerate
    }

    /// Current minimum optical thickness error, `None` until a usable candidate arrives
    pub fn min_error(&self) -> Option<f64> {
        match self.state {
            SweepState::NoResult => None,
            SweepState::BestSoFar { candidate, .. } => Some(candidate.tau_error),
        }
    }

    pub fn best_model(&self) -> Option<AerosolModelId> {
        match self.state {
            SweepState::NoResult => None,
            SweepState::BestSoFar { model, .. } => Some(model),
        }
    }

    /// Compare a model's fit with the best so far
    ///
    /// Degenerate fits never replace a result. Otherwise the candidate wins
    /// when no result exists yet or its tau error is strictly lower.
    pub fn offer(&mut self, model: AerosolModelId, candidate: Option<&Candidate>) -> Transition {
        self.evaluated += 1;
        let flags = self.thresholds.classify(candidate);
        let candidate = match candidate {
            Some(c) if !flags.contains(RetrievalFlags::DEGENERATE_COST) => *c,
            _ => {
                self.degenerate += 1;
                return Transition::Discarded;
            }
        };

        let better = match self.min_error() {
            None => true,
            Some(min_error) => candidate.tau_error < min_error,
        };
        if better {
            self.state = SweepState::BestSoFar {
                model,
                candidate,
                flags,
            };
            Transition::BestSoFar
        } else {
            Transition::Discarded
        }
    }

    /// Close the sweep and produce the immutable pixel result
    ///
    /// `surface_flags` carries the window bits (LAND, CLOUD, BORDER). A pixel
    /// is successful only when the winner triggered no failure bit; failed
    /// pixels report no-data in every output.
    pub fn finish(self, surface_flags: RetrievalFlags) -> PixelRetrievalResult {
        match self.state {
            SweepState::NoResult => {
                let mut flags = surface_flags;
                if self.evaluated > 0 {
                    flags.insert(RetrievalFlags::DEGENERATE_COST);
                }
                PixelRetrievalResult::no_data(self.no_data, flags)
            }
            SweepState::BestSoFar {
                model,
                candidate,
                flags,
            } => {
                let mut flags = flags | surface_flags;
                if flags.intersects(RetrievalFlags::FAILURES) {
                    return PixelRetrievalResult::no_data(self.no_data, flags);
                }
                flags.insert(RetrievalFlags::SUCCESS);
                PixelRetrievalResult {
                    optical_thickness: candidate.tau,
                    angstrom_exponent: candidate.angstrom,
                    tau_error: candidate.tau_error,
                    angstrom_error: candidate.angstrom_error,
                    fit_error: candidate.fit_error,
                    wind_speed: candidate.wind_speed,
                    glint_reflectance: self.no_data,
                    model_id: Some(model),
                    flags,
                }
            }
        }
    }
}
