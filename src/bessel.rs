//! Bessel functions of the first kind used by the diffraction integrands

use scilib::math::bessel;

#[inline]
pub fn j0(x: f64) -> f64 {
    bessel::j_n(0, x)
}

#[inline]
pub fn j1(x: f64) -> f64 {
    bessel::j_n(1, x)
}

#[inline]
pub fn j2(x: f64) -> f64 {
    if x == 0. {
        0.
    } else {
        bessel::j_n(2, x)
    }
}
