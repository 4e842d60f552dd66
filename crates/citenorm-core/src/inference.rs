//! Volume inference from per-ISSN regression models.

use crate::{Issn, ReferenceDatabase};

/// Predicts the volume a journal published in a given year.
pub trait VolumeEstimator: Send + Sync {
    /// Predicted volume, or `None` when no prediction is possible.
    fn infer(&self, issn: &Issn, year: u16) -> Option<u64>;
}

/// Evaluates the snapshot's `volume = a + b * year` equations.
#[derive(Debug, Clone, Copy)]
pub struct VolumeInferencer<'a> {
    db: &'a ReferenceDatabase,
}

impl<'a> VolumeInferencer<'a> {
    pub fn new(db: &'a ReferenceDatabase) -> Self {
        Self { db }
    }
}

impl VolumeEstimator for VolumeInferencer<'_> {
    fn infer(&self, issn: &Issn, year: u16) -> Option<u64> {
        let equation = self.db.equation(issn)?;
        let volume = equation.predict(year).round_ties_even();

        if volume.is_finite() && volume > 0.0 {
            Some(volume as u64)
        } else {
            tracing::trace!(%issn, year, volume, "inferred volume not positive");
            None
        }
    }
}
