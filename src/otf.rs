//! Optical transfer function synthesis
//!
//! A real and even transfer function defined over the positive frequencies is
//! expanded to the full Hermitian symmetric spectrum, inverse transformed and
//! shifted so that the zero frequency lands at `(nx/2, ny/2)`.

use rustfft::{num_complex::Complex64, FftPlanner};

use crate::{cancel::CancellationToken, models::ModelError};

/// Spectrum `nx`x`ny` from the half spectrum `transfer(x, y)`, `x <= nx/2`, `y <= ny/2`
pub fn fill_hermitian<F>(nx: usize, ny: usize, transfer: F) -> Vec<Complex64>
where
    F: Fn(usize, usize) -> f64,
{
    let mut spectrum = Vec::with_capacity(nx * ny);
    for y in 0..ny {
        let v = y.min(ny - y);
        for x in 0..nx {
            let u = x.min(nx - x);
            spectrum.push(Complex64::new(transfer(u, v), 0.));
        }
    }
    spectrum
}

/// In place inverse 2D DFT normalized by `nx*ny`
pub fn inverse_2d(buffer: &mut [Complex64], nx: usize, ny: usize) {
    let mut planner = FftPlanner::<f64>::new();
    let rows = planner.plan_fft_inverse(nx);
    buffer.chunks_mut(nx).for_each(|row| rows.process(row));
    let columns = planner.plan_fft_inverse(ny);
    let mut column = vec![Complex64::default(); ny];
    for x in 0..nx {
        column
            .iter_mut()
            .enumerate()
            .for_each(|(y, c)| *c = buffer[x + nx * y]);
        columns.process(&mut column);
        column
            .iter()
            .enumerate()
            .for_each(|(y, c)| buffer[x + nx * y] = *c);
    }
    let n = (nx * ny) as f64;
    buffer.iter_mut().for_each(|c| *c /= n);
}

/// Circular shift by `(nx/2, ny/2)` of the real part of `buffer` into `plane`
pub fn shift_into(buffer: &[Complex64], nx: usize, ny: usize, plane: &mut [f64]) {
    let (hx, hy) = (nx / 2, ny / 2);
    for y in 0..ny {
        let ys = (y + hy) % ny;
        for x in 0..nx {
            plane[(x + hx) % nx + nx * ys] = buffer[x + nx * y].re;
        }
    }
}

/// Writes the centred point spread function of the transfer function into `plane`
pub fn synthesize<F>(
    nx: usize,
    ny: usize,
    cancel: &CancellationToken,
    transfer: F,
    plane: &mut [f64],
) -> Result<(), ModelError>
where
    F: Fn(usize, usize) -> f64,
{
    let mut spectrum = fill_hermitian(nx, ny, transfer);
    if cancel.is_cancelled() {
        return Err(ModelError::Cancelled);
    }
    inverse_2d(&mut spectrum, nx, ny);
    if cancel.is_cancelled() {
        return Err(ModelError::Cancelled);
    }
    shift_into(&spectrum, nx, ny, plane);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn flat_transfer_is_a_centred_impulse() {
        let (nx, ny) = (8, 4);
        let mut plane = vec![0f64; nx * ny];
        synthesize(nx, ny, &CancellationToken::new(), |_, _| 1., &mut plane).unwrap();
        for (k, value) in plane.iter().enumerate() {
            let expected = if k == nx / 2 + nx * (ny / 2) { 1. } else { 0. };
            assert_abs_diff_eq!(*value, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn hermitian_expansion_is_even() {
        let spectrum = fill_hermitian(8, 8, |x, y| (x + 10 * y) as f64);
        assert_eq!(spectrum[1 + 8 * 2], spectrum[7 + 8 * 6]);
        assert_eq!(spectrum[4].re, 4.);
        assert_eq!(spectrum[5].re, 3.);
    }

    #[test]
    fn gaussian_transfer_keeps_unit_sum() {
        let (nx, ny) = (16, 16);
        let mut plane = vec![0f64; nx * ny];
        let transfer = |x: usize, y: usize| {
            let w = std::f64::consts::PI * (x as f64).hypot(y as f64) / 8.;
            (-w * w).exp()
        };
        synthesize(nx, ny, &CancellationToken::new(), transfer, &mut plane).unwrap();
        assert_abs_diff_eq!(plane.iter().sum::<f64>(), 1., epsilon = 1e-12);
        assert_abs_diff_eq!(plane[7 + 16 * 8], plane[9 + 16 * 8], epsilon = 1e-12);
    }
}
