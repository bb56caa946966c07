//! Radial intensity table of rotationally symmetric planes
//!
//! The intensity of the diffraction models depends only on the distance to the
//! optical axis: the diffraction integral is evaluated once per radius sample
//! and the plane is reconstructed by linear interpolation of the table.

use crate::{cancel::CancellationToken, models::ModelError};

/// Intensity sampled every `1/oversampling` pixel from the optical axis
#[derive(Debug, Clone, PartialEq)]
pub struct RadialProfile {
    oversampling: usize,
    values: Vec<f64>,
}
impl RadialProfile {
    /// Largest radius [pixel] of the table for a `nx`x`ny` plane
    pub fn max_radius(nx: usize, ny: usize) -> usize {
        (nx as f64 / 2.).hypot(ny as f64 / 2.).ceil() as usize + 1
    }
    /// Samples `intensity` at the radii `n/oversampling` [pixel]
    ///
    /// The table holds one guard sample past `max_radius * oversampling`.
    /// The cancellation token is polled after each sample.
    pub fn build<F>(
        nx: usize,
        ny: usize,
        oversampling: usize,
        cancel: &CancellationToken,
        mut intensity: F,
    ) -> Result<Self, ModelError>
    where
        F: FnMut(f64) -> Result<f64, ModelError>,
    {
        let oversampling = oversampling.max(1);
        let n = Self::max_radius(nx, ny) * oversampling + 1;
        let mut values = Vec::with_capacity(n);
        for i in 0..n {
            values.push(intensity(i as f64 / oversampling as f64)?);
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
        }
        Ok(Self {
            oversampling,
            values,
        })
    }
    pub fn oversampling(&self) -> usize {
        self.oversampling
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    /// Linear interpolation at radius `r` [pixel]
    pub fn value_at(&self, r: f64) -> f64 {
        let s = self.oversampling as f64;
        let last = self.values.len().saturating_sub(2);
        let i = ((r * s).floor() as usize).min(last);
        let (h0, h1) = (self.values[i], self.values[i + 1]);
        h0 + (h1 - h0) * (r - i as f64 / s) * s
    }
    /// Writes the plane centred on `((nx-1)/2, (ny-1)/2)`, polling `cancel` once per row
    pub fn render(
        &self,
        nx: usize,
        cancel: &CancellationToken,
        plane: &mut [f64],
    ) -> Result<(), ModelError> {
        let ny = plane.len() / nx;
        let x0 = (nx as f64 - 1.) / 2.;
        let y0 = (ny as f64 - 1.) / 2.;
        for (y, row) in plane.chunks_mut(nx).enumerate() {
            let dy = y as f64 - y0;
            for (x, value) in row.iter_mut().enumerate() {
                *value = self.value_at((x as f64 - x0).hypot(dy));
            }
            if cancel.is_cancelled() {
                return Err(ModelError::Cancelled);
            }
        }
        Ok(())
    }
}
