//! # Multi-Peak Fitting
//!
//! A state machine for fitting a sum of N identical peaks on a shared offset.
//!
//! Peaks are seeded one at a time, e.g. from points clicked on a plot, or all at
//! once. The machine only becomes [`MultiPeakState::Ready`] once exactly N
//! centers are known; it has no dependency on any event loop, so a GUI simply
//! forwards each click to [`MultiPeakFit::add_peak`].
//!
//! ```text
//! CollectingPeaks(0 of N) --add_peak--> ... --add_peak--> Ready
//! Ready --fit--> Fitting --> Done
//! Done --fit--> Fitting (refit)      Done --reset--> CollectingPeaks(0 of N)
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use curvefit_rs::multipeak::{MultiPeakFit, MultiPeakState};
//! use curvefit_rs::{Dataset, PeakShape};
//!
//! let x: Vec<f64> = (0..200).map(|i| i as f64 * 0.1).collect();
//! let y: Vec<f64> = x
//!     .iter()
//!     .map(|&x| 5.0 * (-(x - 6.0f64).powi(2)).exp() + 3.0 * (-(x - 14.0f64).powi(2)).exp())
//!     .collect();
//! let data = Dataset::new("two peaks", &x, &y).unwrap();
//!
//! let mut multi = MultiPeakFit::new(PeakShape::Gaussian, 2).unwrap();
//! multi.add_peak(6.2, 4.8).unwrap();
//! multi.add_peak(13.9, 2.9).unwrap();
//! assert_eq!(multi.state(), MultiPeakState::Ready);
//!
//! let result = multi.fit(&data).unwrap();
//! let peaks = result.peaks.as_ref().unwrap();
//! assert_eq!(peaks.len(), 2);
//! assert!((peaks[0].center - 6.0).abs() < 1e-3);
//! ```

use log::{debug, info};
use std::fmt;

use crate::data::Dataset;
use crate::error::{InputError, Result};
use crate::fit::{FitConfig, FitResult, Fitter};
use crate::model::FitModel;
use crate::models::peak::{seeded_guess, PARAMS_PER_PEAK};
use crate::models::{BuiltinModel, PeakSeed, PeakShape};

/// Where a multi-peak fit stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiPeakState {
    /// `collected` of `total` peak centers have been set.
    CollectingPeaks { collected: usize, total: usize },
    Ready,
    Fitting,
    Done,
}

impl fmt::Display for MultiPeakState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MultiPeakState::CollectingPeaks { collected, total } => {
                write!(f, "collecting peaks ({} of {})", collected, total)
            }
            MultiPeakState::Ready => f.write_str("ready"),
            MultiPeakState::Fitting => f.write_str("fitting"),
            MultiPeakState::Done => f.write_str("done"),
        }
    }
}

/// A fit of `peaks` identical peaks plus one offset, `3N + 1` parameters.
#[derive(Debug)]
pub struct MultiPeakFit {
    shape: PeakShape,
    peaks: usize,
    seeds: Vec<PeakSeed>,
    state: MultiPeakState,
    fitter: Fitter,
    last: Option<FitResult>,
}

impl MultiPeakFit {
    /// Start collecting `peaks` centers, fitting with the default configuration.
    ///
    /// # Errors
    ///
    /// * `InputError::InvalidPeakCount` if `peaks` is zero
    pub fn new(shape: PeakShape, peaks: usize) -> Result<Self> {
        Self::with_fitter(shape, peaks, Fitter::new(FitConfig::default()))
    }

    /// Like [`MultiPeakFit::new`], fitting through `fitter` and its sinks.
    pub fn with_fitter(shape: PeakShape, peaks: usize, fitter: Fitter) -> Result<Self> {
        if peaks == 0 {
            return Err(InputError::InvalidPeakCount.into());
        }
        Ok(Self {
            shape,
            peaks,
            seeds: Vec::with_capacity(peaks),
            state: MultiPeakState::CollectingPeaks {
                collected: 0,
                total: peaks,
            },
            fitter,
            last: None,
        })
    }

    pub fn state(&self) -> MultiPeakState {
        self.state
    }

    pub fn shape(&self) -> PeakShape {
        self.shape
    }

    pub fn peak_count(&self) -> usize {
        self.peaks
    }

    pub fn parameter_count(&self) -> usize {
        PARAMS_PER_PEAK * self.peaks + 1
    }

    pub fn seeds(&self) -> &[PeakSeed] {
        &self.seeds
    }

    /// The model this machine fits.
    pub fn model(&self) -> FitModel {
        BuiltinModel::PeakSum {
            shape: self.shape,
            peaks: self.peaks,
        }
        .into()
    }

    /// The result of the most recent successful fit.
    pub fn last_result(&self) -> Option<&FitResult> {
        self.last.as_ref()
    }

    /// Seed the next peak at a picked point; `y` seeds its height.
    ///
    /// # Errors
    ///
    /// * `InputError::InvalidState` unless peaks are still being collected
    pub fn add_peak(&mut self, x: f64, y: f64) -> Result<MultiPeakState> {
        let total = match self.state {
            MultiPeakState::CollectingPeaks { total, .. } => total,
            other => {
                return Err(InputError::InvalidState(format!(
                    "cannot add a peak while {}",
                    other
                ))
                .into())
            }
        };

        self.seeds.push(PeakSeed::with_height(x, y));
        let collected = self.seeds.len();
        debug!("Peak {} of {} seeded at x = {}", collected, total, x);

        self.state = if collected == total {
            MultiPeakState::Ready
        } else {
            MultiPeakState::CollectingPeaks { collected, total }
        };
        Ok(self.state)
    }

    /// Set all centers at once, replacing any collected seeds.
    ///
    /// # Errors
    ///
    /// * `InputError::SeedCountMismatch` unless exactly N centers are given
    /// * `InputError::InvalidState` while a fit is running
    pub fn set_centers(&mut self, centers: &[f64]) -> Result<()> {
        self.set_seeds(centers.iter().map(|&c| PeakSeed::at(c)).collect())
    }

    /// Set all seeds at once, replacing any collected ones.
    pub fn set_seeds(&mut self, seeds: Vec<PeakSeed>) -> Result<()> {
        if self.state == MultiPeakState::Fitting {
            return Err(InputError::InvalidState("cannot reseed while fitting".to_string()).into());
        }
        if seeds.len() != self.peaks {
            return Err(InputError::SeedCountMismatch {
                expected: self.peaks,
                actual: seeds.len(),
            }
            .into());
        }
        self.seeds = seeds;
        self.state = MultiPeakState::Ready;
        Ok(())
    }

    /// Fit the seeded peaks to `dataset`.
    ///
    /// Allowed from `Ready`, or from `Done` to refit. On success the machine is
    /// `Done` and the result carries the per-peak breakdown; on error it returns
    /// to `Ready` so the fit can be retried.
    ///
    /// # Errors
    ///
    /// * `InputError::InvalidState` if not all peaks are seeded yet
    /// * any error of [`Fitter::fit_with_guess`]
    pub fn fit(&mut self, dataset: &Dataset<'_>) -> Result<FitResult> {
        if !matches!(self.state, MultiPeakState::Ready | MultiPeakState::Done) {
            return Err(InputError::InvalidState(format!("cannot fit while {}", self.state)).into());
        }

        self.state = MultiPeakState::Fitting;
        let outcome = dataset
            .filter(self.fitter.config().x_range)
            .and_then(|data| {
                let guess = seeded_guess(self.shape, &data, &self.seeds);
                self.fitter.fit_with_guess(dataset, &self.model(), &guess)
            });

        match outcome {
            Ok(result) => {
                info!(
                    "Multi-peak fit of {} {} peaks to '{}': {}",
                    self.peaks,
                    self.shape.label(),
                    dataset.name(),
                    result.status
                );
                self.state = MultiPeakState::Done;
                self.last = Some(result.clone());
                Ok(result)
            }
            Err(err) => {
                self.state = MultiPeakState::Ready;
                Err(err)
            }
        }
    }

    /// Drop the seeds and the last result and start collecting again.
    pub fn reset(&mut self) {
        self.seeds.clear();
        self.last = None;
        self.state = MultiPeakState::CollectingPeaks {
            collected: 0,
            total: self.peaks,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;

    #[test]
    fn test_collecting_peaks() {
        let mut multi = MultiPeakFit::new(PeakShape::Lorentzian, 3).unwrap();
        assert_eq!(multi.parameter_count(), 10);
        assert_eq!(
            multi.state(),
            MultiPeakState::CollectingPeaks {
                collected: 0,
                total: 3
            }
        );

        assert_eq!(
            multi.add_peak(1.0, 2.0).unwrap(),
            MultiPeakState::CollectingPeaks {
                collected: 1,
                total: 3
            }
        );
        multi.add_peak(2.0, 2.0).unwrap();
        assert_eq!(multi.add_peak(3.0, 2.0).unwrap(), MultiPeakState::Ready);

        let err = multi.add_peak(4.0, 2.0).unwrap_err();
        assert!(matches!(err, FitError::Input(InputError::InvalidState(_))));
        assert_eq!(multi.seeds().len(), 3);
    }

    #[test]
    fn test_zero_peaks_rejected() {
        let err = MultiPeakFit::new(PeakShape::Gaussian, 0).unwrap_err();
        assert_eq!(err.as_input(), Some(&InputError::InvalidPeakCount));
    }

    #[test]
    fn test_fit_before_ready() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let y = [0.0, 1.0, 3.0, 1.0, 0.0];
        let data = Dataset::new("peak", &x, &y).unwrap();

        let mut multi = MultiPeakFit::new(PeakShape::Gaussian, 2).unwrap();
        multi.add_peak(2.0, 3.0).unwrap();
        assert!(multi.fit(&data).is_err());
        assert_eq!(
            multi.state(),
            MultiPeakState::CollectingPeaks {
                collected: 1,
                total: 2
            }
        );
    }

    #[test]
    fn test_set_centers_count() {
        let mut multi = MultiPeakFit::new(PeakShape::Gaussian, 2).unwrap();
        let err = multi.set_centers(&[1.0]).unwrap_err();
        assert_eq!(
            err.as_input(),
            Some(&InputError::SeedCountMismatch {
                expected: 2,
                actual: 1
            })
        );
        multi.set_centers(&[1.0, 2.0]).unwrap();
        assert_eq!(multi.state(), MultiPeakState::Ready);

        multi.reset();
        assert!(multi.seeds().is_empty());
        assert!(matches!(
            multi.state(),
            MultiPeakState::CollectingPeaks { collected: 0, .. }
        ));
    }
}
