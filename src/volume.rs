/*!
# PSF volume

The volume holds `nz` planes of `nx*ny` intensities, row-major within a plane:
the voxel `(x,y,z)` is at the linear index `x + nx*y` of plane `z`.

Once all the planes are computed, [Volume::analyze] derives the statistics
(maximum, energy, FWHM, per-plane statistics) and [Volume::rescale] maps the
intensities in place.
*/

use itertools::iproduct;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;

use crate::config::{FwhmWalk, Geometry, Optics, Scale};

/// Floor of the normalized intensity for the non-linear scales
pub const RATIO_FLOOR: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VolumeError {
    #[error("expected {expected} voxels, found {found}")]
    Size { expected: usize, found: usize },
    #[error("cannot rescale the volume with a maximum of {0}")]
    Maximum(f64),
    #[error("the volume is already rescaled ({0:?})")]
    AlreadyRescaled(Scale),
}
type Result<T> = std::result::Result<T, VolumeError>;

/// Voxel location and value
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct Voxel {
    pub x: usize,
    pub y: usize,
    pub z: usize,
    pub value: f64,
}

/// Full width at half maximum box around the maximum
///
/// For each axis, `lower` is the first index of the box and `upper` the first
/// index past the maximum where the intensity drops below half the maximum
/// (or the axis length).
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct Fwhm {
    pub lower: [usize; 3],
    pub upper: [usize; 3],
    /// Sum of the intensities inside the box
    pub energy: f64,
}
impl Fwhm {
    /// Widths along x, y and z [voxel]
    pub fn widths(&self) -> [usize; 3] {
        [
            self.upper[0] - self.lower[0],
            self.upper[1] - self.lower[1],
            self.upper[2] - self.lower[2],
        ]
    }
}

/// Statistics of one plane
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct PlaneStatistics {
    pub z: usize,
    /// Plane maximum over the volume maximum
    pub relative_maximum: f64,
    /// Plane energy over the volume energy
    pub relative_energy: f64,
    /// Intensity weighted RMS distance to the plane center [pixel]
    pub efficiency_radius: f64,
}

/// Statistics of the volume before rescaling
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub maximum: Voxel,
    /// Sum of the squared intensities
    pub energy: f64,
    pub fwhm: Fwhm,
    pub planes: Vec<PlaneStatistics>,
}

#[derive(Debug, Clone)]
pub struct Volume {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    data: Vec<f64>,
    optics: Optics,
    geometry: Geometry,
    statistics: Option<Statistics>,
    scale: Option<Scale>,
}
impl Volume {
    fn with_data(optics: Optics, geometry: Geometry, data: Vec<f64>) -> Self {
        Self {
            nx: geometry.nx,
            ny: geometry.ny,
            nz: geometry.nz,
            data,
            optics,
            geometry,
            statistics: None,
            scale: None,
        }
    }
    /// Zero filled volume
    pub fn new(optics: Optics, geometry: Geometry) -> Self {
        Self::with_data(optics, geometry, vec![0f64; geometry.len()])
    }
    /// Volume from the planes in `data`
    pub fn from_data(optics: Optics, geometry: Geometry, data: Vec<f64>) -> Result<Self> {
        if data.len() != geometry.len() {
            return Err(VolumeError::Size {
                expected: geometry.len(),
                found: data.len(),
            });
        }
        Ok(Self::with_data(optics, geometry, data))
    }
    pub fn optics(&self) -> &Optics {
        &self.optics
    }
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }
    pub fn plane_len(&self) -> usize {
        self.nx * self.ny
    }
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn data(&self) -> &[f64] {
        &self.data
    }
    pub fn into_data(self) -> Vec<f64> {
        self.data
    }
    pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
        self.data[x + self.nx * y + self.plane_len() * z]
    }
    pub fn plane(&self, z: usize) -> &[f64] {
        let n = self.plane_len();
        &self.data[z * n..(z + 1) * n]
    }
    pub fn planes(&self) -> std::slice::Chunks<'_, f64> {
        self.data.chunks(self.plane_len())
    }
    pub(crate) fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }
    /// Statistics computed by [Volume::analyze]
    pub fn statistics(&self) -> Option<&Statistics> {
        self.statistics.as_ref()
    }
    /// Per-plane statistics computed by [Volume::analyze]
    pub fn plane_statistics(&self) -> &[PlaneStatistics] {
        self.statistics
            .as_ref()
            .map(|stats| stats.planes.as_slice())
            .unwrap_or_default()
    }
    /// Scale applied by [Volume::rescale]
    pub fn scale(&self) -> Option<Scale> {
        self.scale
    }

    /// Maximum, first in scan order, and sum of the squared intensities
    pub fn maximum_and_energy(&self) -> (Voxel, f64) {
        let nx = self.nx;
        let mut maximum = Voxel {
            value: f64::MIN,
            ..Default::default()
        };
        let mut energy = 0f64;
        for (z, plane) in self.planes().enumerate() {
            for (k, &value) in plane.iter().enumerate() {
                energy += value * value;
                if maximum.value < value {
                    maximum = Voxel {
                        x: k % nx,
                        y: k / nx,
                        z,
                        value,
                    };
                }
            }
        }
        (maximum, energy)
    }
    /// FWHM box around `maximum`
    pub fn estimate_fwhm(&self, maximum: &Voxel, walk: FwhmWalk) -> Fwhm {
        let half = maximum.value * 0.5;
        let Voxel { x, y, z, .. } = *maximum;
        let along_x = |i: usize| self.get(i, y, z);
        let along_y = |i: usize| self.get(x, i, z);
        let along_z = |i: usize| self.get(x, y, i);
        let upper = |start: usize, n: usize, value: &dyn Fn(usize) -> f64| {
            (start..n).find(|&i| value(i) < half).unwrap_or(n)
        };
        let lower = |start: usize, value: &dyn Fn(usize) -> f64| match walk {
            FwhmWalk::Legacy => start,
            FwhmWalk::Bidirectional => (0..start)
                .rev()
                .find(|&i| value(i) < half)
                .map_or(0, |i| i + 1),
        };
        let lower = [lower(x, &along_x), lower(y, &along_y), lower(z, &along_z)];
        let upper = [
            upper(x, self.nx, &along_x),
            upper(y, self.ny, &along_y),
            upper(z, self.nz, &along_z),
        ];
        // both walks stop on the first voxel below half the maximum, the
        // bidirectional box leaves it out at both ends
        let end = |upper: usize, n: usize| match walk {
            FwhmWalk::Legacy => (upper + 1).min(n),
            FwhmWalk::Bidirectional => upper,
        };
        let energy = iproduct!(
            lower[2]..end(upper[2], self.nz),
            lower[1]..end(upper[1], self.ny),
            lower[0]..end(upper[0], self.nx)
        )
        .map(|(k, j, i)| self.get(i, j, k))
        .sum();
        Fwhm {
            lower,
            upper,
            energy,
        }
    }
    /// Per-plane maximum, energy and efficiency radius relative to the volume ones
    pub fn compute_plane_statistics(&self, maximum: f64, energy: f64) -> Vec<PlaneStatistics> {
        let (nx, ny) = (self.nx, self.ny);
        let x0 = (nx as f64 - 1.) / 2.;
        let y0 = (ny as f64 - 1.) / 2.;
        self.data
            .par_chunks(self.plane_len())
            .enumerate()
            .map(|(z, plane)| {
                let plane_max = plane.iter().cloned().fold(f64::MIN, f64::max);
                let plane_energy: f64 = plane.iter().map(|v| v * v).sum();
                let (sum, moment) = plane.iter().enumerate().fold(
                    (0f64, 0f64),
                    |(sum, moment), (k, &value)| {
                        let dx = (k % nx) as f64 - x0;
                        let dy = (k / nx) as f64 - y0;
                        (sum + value, moment + value * (dx * dx + dy * dy))
                    },
                );
                PlaneStatistics {
                    z,
                    relative_maximum: plane_max / maximum,
                    relative_energy: plane_energy / energy,
                    efficiency_radius: (moment / sum).sqrt(),
                }
            })
            .collect()
    }
    /// Computes and stores the volume statistics
    pub fn analyze(&mut self, walk: FwhmWalk) -> &Statistics {
        let (maximum, energy) = self.maximum_and_energy();
        let fwhm = self.estimate_fwhm(&maximum, walk);
        let planes = self.compute_plane_statistics(maximum.value, energy);
        self.statistics.insert(Statistics {
            maximum,
            energy,
            fwhm,
            planes,
        })
    }
    /// Maps the intensities in place according to `scale`
    ///
    /// The intensities are normalized by the maximum of the statistics, or of
    /// the volume if it has not been analyzed. The non-linear scales clamp the
    /// normalized intensities to [RATIO_FLOOR].
    /// A volume is rescaled at most once.
    pub fn rescale(&mut self, scale: Scale) -> Result<()> {
        if let Some(scale) = self.scale {
            return Err(VolumeError::AlreadyRescaled(scale));
        }
        let maximum = match &self.statistics {
            Some(stats) => stats.maximum.value,
            None => self.maximum_and_energy().0.value,
        };
        if !(maximum.is_finite() && maximum > 0.) {
            return Err(VolumeError::Maximum(maximum));
        }
        let map: fn(f64) -> f64 = match scale {
            Scale::Linear => |v| v,
            Scale::Log => |v| v.max(RATIO_FLOOR).ln(),
            Scale::Sqrt => |v| v.max(RATIO_FLOOR).sqrt(),
            Scale::Decibel => |v| 20. * v.max(RATIO_FLOOR).log10(),
        };
        self.data
            .par_iter_mut()
            .for_each(|v| *v = map(*v / maximum));
        self.scale = Some(scale);
        Ok(())
    }
    /// Plane `z` as single precision floats
    pub fn as_f32(&self, z: usize) -> Vec<f32> {
        self.plane(z).iter().map(|&v| v as f32).collect()
    }
    /// Plane `z` scaled by 255 and clamped to `[0,255]`
    pub fn as_u8(&self, z: usize) -> Vec<u8> {
        self.plane(z)
            .iter()
            .map(|&v| (v * 255.).clamp(0., 255.) as u8)
            .collect()
    }
    /// Plane `z` scaled by 65535 and clamped to `[0,65535]`
    pub fn as_u16(&self, z: usize) -> Vec<u16> {
        self.plane(z)
            .iter()
            .map(|&v| (v * 65535.).clamp(0., 65535.) as u16)
            .collect()
    }
    /// Histogram of the intensities over `[0,1]` in `nbins` bins
    ///
    /// Negative intensities are skipped, intensities above 1 fall in the last bin.
    pub fn histogram(&self, nbins: usize) -> Vec<usize> {
        let mut histogram = vec![0usize; nbins];
        if nbins == 0 {
            return histogram;
        }
        self.data
            .iter()
            .filter(|v| **v >= 0.)
            .map(|v| ((v * nbins as f64) as usize).min(nbins - 1))
            .for_each(|i| histogram[i] += 1);
        histogram
    }

    /// Summary report of an analyzed volume
    pub fn summary(&self) -> Option<Summary> {
        self.statistics.as_ref().map(|stats| Summary {
            optics: self.optics,
            geometry: self.geometry,
            energy: stats.energy,
            fwhm: stats.fwhm,
            maximum: stats.maximum,
        })
    }
}

/// Acquisition settings and volume statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub optics: Optics,
    pub geometry: Geometry,
    pub energy: f64,
    pub fwhm: Fwhm,
    pub maximum: Voxel,
}
impl Summary {
    /// Physical size of the volume [nm]
    pub fn size_nm(&self) -> [f64; 3] {
        let g = &self.geometry;
        [
            g.nx as f64 * g.pixel_size_nm,
            g.ny as f64 * g.pixel_size_nm,
            g.nz as f64 * g.z_step_nm,
        ]
    }
    /// FWHM widths [nm]
    pub fn fwhm_nm(&self) -> [f64; 3] {
        let [x, y, z] = self.fwhm.widths();
        let g = &self.geometry;
        [
            x as f64 * g.pixel_size_nm,
            y as f64 * g.pixel_size_nm,
            z as f64 * g.z_step_nm,
        ]
    }
    /// Maximum location [nm]
    pub fn maximum_nm(&self) -> [f64; 3] {
        let g = &self.geometry;
        [
            self.maximum.x as f64 * g.pixel_size_nm,
            self.maximum.y as f64 * g.pixel_size_nm,
            self.maximum.z as f64 * g.z_step_nm,
        ]
    }
}
impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = &self.geometry;
        let [fx, fy, fz] = self.fwhm.widths();
        let fwhm_nm = self.fwhm_nm();
        let size = self.size_nm();
        let max_nm = self.maximum_nm();
        writeln!(f, "{:<24}{}", "NA", self.optics.numerical_aperture)?;
        writeln!(f, "{:<24}{} nm", "Wavelength", self.optics.wavelength_nm)?;
        writeln!(f, "{:<24}{:e}", "Energy", self.energy)?;
        writeln!(
            f,
            "{:<24}{} x {} x {} nm",
            "Size", size[0], size[1], size[2]
        )?;
        writeln!(
            f,
            "{:<24}{} x {} x {} nm",
            "Pixel size", g.pixel_size_nm, g.pixel_size_nm, g.z_step_nm
        )?;
        writeln!(f, "{:<24}{} x {} x {} pixels", "FWHM", fx, fy, fz)?;
        writeln!(
            f,
            "{:<24}{} x {} x {} nm",
            "FWHM", fwhm_nm[0], fwhm_nm[1], fwhm_nm[2]
        )?;
        writeln!(f, "{:<24}{:e}", "Energy under FWHM", self.fwhm.energy)?;
        writeln!(
            f,
            "{:<24}({}, {}, {}) pixels",
            "Maximum position", self.maximum.x, self.maximum.y, self.maximum.z
        )?;
        writeln!(
            f,
            "{:<24}({}, {}, {}) nm",
            "Maximum position", max_nm[0], max_nm[1], max_nm[2]
        )?;
        write!(f, "{:<24}{:e}", "Maximum", self.maximum.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use strum::IntoEnumIterator;

    fn volume(nx: usize, ny: usize, nz: usize, f: impl Fn(usize, usize, usize) -> f64) -> Volume {
        let data = iproduct!(0..nz, 0..ny, 0..nx)
            .map(|(z, y, x)| f(x, y, z))
            .collect();
        Volume::from_data(Optics::default(), Geometry::new(nx, ny, nz), data).unwrap()
    }

    #[test]
    fn uniform_volume() {
        let v = 0.5;
        let volume = volume(4, 5, 3, |_, _, _| v);
        let (maximum, energy) = volume.maximum_and_energy();
        assert_eq!(
            maximum,
            Voxel {
                x: 0,
                y: 0,
                z: 0,
                value: v
            }
        );
        assert_abs_diff_eq!(energy, v * v * 60., epsilon = 1e-12);
    }

    #[test]
    fn size_mismatch() {
        let err = Volume::from_data(Optics::default(), Geometry::new(4, 4, 3), vec![0.; 10])
            .unwrap_err();
        assert_eq!(
            err,
            VolumeError::Size {
                expected: 48,
                found: 10
            }
        );
    }

    #[test]
    fn linear_rescale_round_trip() {
        let mut volume = volume(6, 4, 3, |x, y, z| (x + 2 * y + 3 * z) as f64 + 0.25);
        let original = volume.data().to_vec();
        let (maximum, _) = volume.maximum_and_energy();
        volume.rescale(Scale::Linear).unwrap();
        assert_eq!(volume.scale(), Some(Scale::Linear));
        for (a, b) in volume.data().iter().zip(&original) {
            assert_abs_diff_eq!(a * maximum.value, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn second_rescale_is_rejected() {
        let mut volume = volume(6, 4, 3, |x, y, z| (x + 2 * y + 3 * z) as f64 + 0.25);
        volume.analyze(FwhmWalk::default());
        volume.rescale(Scale::Sqrt).unwrap();
        let rescaled = volume.data().to_vec();
        for scale in Scale::iter() {
            assert_eq!(
                volume.rescale(scale),
                Err(VolumeError::AlreadyRescaled(Scale::Sqrt))
            );
        }
        assert_eq!(volume.data(), rescaled.as_slice());
        assert_eq!(volume.scale(), Some(Scale::Sqrt));
    }

    #[test]
    fn nonlinear_scales_clamp_the_ratio() {
        for scale in Scale::iter() {
            let mut volume = volume(4, 4, 3, |x, _, _| if x == 0 { 2. } else { 0. });
            volume.rescale(scale).unwrap();
            let expected_max = match scale {
                Scale::Decibel | Scale::Log => 0.,
                _ => 1.,
            };
            assert_abs_diff_eq!(volume.get(0, 0, 0), expected_max, epsilon = 1e-12);
            let floor = volume.get(1, 0, 0);
            let expected_floor = match scale {
                Scale::Linear => 0.,
                Scale::Log => RATIO_FLOOR.ln(),
                Scale::Sqrt => 1e-3,
                Scale::Decibel => -120.,
            };
            assert_abs_diff_eq!(floor, expected_floor, epsilon = 1e-9);
        }
    }

    #[test]
    fn zero_volume_cannot_be_rescaled() {
        let mut volume = volume(4, 4, 3, |_, _, _| 0.);
        assert_eq!(volume.rescale(Scale::Linear), Err(VolumeError::Maximum(0.)));
    }

    fn peak(x: usize, y: usize, z: usize) -> f64 {
        let d = |i: usize, c: usize| (i as f64 - c as f64).abs();
        (8. - 2. * (d(x, 4) + d(y, 3)) - 3. * d(z, 2)).max(0.)
    }

    #[test]
    fn bidirectional_fwhm() {
        let volume = volume(9, 7, 5, peak);
        let (maximum, _) = volume.maximum_and_energy();
        assert_eq!((maximum.x, maximum.y, maximum.z), (4, 3, 2));
        let fwhm = volume.estimate_fwhm(&maximum, FwhmWalk::Bidirectional);
        // 8 - 2d >= 4 for d <= 2, 8 - 3d >= 4 for d <= 1
        assert_eq!(fwhm.lower, [2, 1, 1]);
        assert_eq!(fwhm.upper, [7, 6, 4]);
        assert_eq!(fwhm.widths(), [5, 5, 3]);
        // the first voxels below half the maximum are out at both ends
        let energy: f64 = iproduct!(1..4, 1..6, 2..7)
            .map(|(z, y, x)| peak(x, y, z))
            .sum();
        assert_abs_diff_eq!(fwhm.energy, energy, epsilon = 1e-12);
    }

    #[test]
    fn legacy_fwhm_walks_forward_only() {
        let volume = volume(9, 7, 5, peak);
        let (maximum, _) = volume.maximum_and_energy();
        let fwhm = volume.estimate_fwhm(&maximum, FwhmWalk::Legacy);
        assert_eq!(fwhm.lower, [4, 3, 2]);
        assert_eq!(fwhm.upper, [7, 6, 4]);
        let energy: f64 = iproduct!(2..=4, 3..=6, 4..=7)
            .map(|(z, y, x)| peak(x, y, z))
            .sum();
        assert_abs_diff_eq!(fwhm.energy, energy, epsilon = 1e-12);
    }

    #[test]
    fn plane_statistics() {
        let mut volume = volume(4, 4, 3, |_, _, z| (z + 1) as f64);
        let stats = volume.analyze(FwhmWalk::default()).clone();
        assert_eq!(stats.maximum.z, 2);
        let planes = volume.plane_statistics();
        assert_eq!(planes.len(), 3);
        assert_abs_diff_eq!(planes[0].relative_maximum, 1. / 3., epsilon = 1e-12);
        assert_abs_diff_eq!(planes[1].relative_energy, 4. / 14., epsilon = 1e-12);
        // uniform plane: mean of (x-1.5)² + (y-1.5)² = 2 * 1.25
        assert_abs_diff_eq!(planes[2].efficiency_radius, 2.5f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn output_conversions() {
        let volume = volume(4, 4, 3, |x, _, _| x as f64 / 2. - 0.25);
        assert_eq!(&volume.as_u8(0)[..4], &[0, 63, 191, 255]);
        assert_eq!(&volume.as_u16(0)[..4], &[0, 16383, 49151, 65535]);
        assert_eq!(volume.as_f32(1)[1], 0.25f32);
        let histogram = volume.histogram(4);
        // 0.25, 0.75 and 1.25 per row
        assert_eq!(histogram, vec![0, 12, 0, 24]);
    }

    #[test]
    fn summary_requires_statistics() {
        let mut volume = volume(4, 4, 3, |x, y, z| peak(x, y, z));
        assert!(volume.summary().is_none());
        volume.analyze(FwhmWalk::default());
        let summary = volume.summary().unwrap();
        assert_eq!(summary.size_nm(), [400., 400., 750.]);
        assert!(summary.to_string().contains("Energy under FWHM"));
    }
}
