//! Checks run before any plane is computed

/// Geometry or parameter constraint that is not met
///
/// Validation errors are raised before the volume is allocated:
/// the caller may correct the settings and try again.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("nz should be at least {min}, found {nz}")]
    TooFewPlanes { nz: usize, min: usize },
    #[error("{axis} should be at least {min}, found {n}")]
    TooFewPixels {
        axis: &'static str,
        n: usize,
        min: usize,
    },
    #[error("{axis} should be a power of 2, found {n}")]
    NotPowerOfTwo { axis: &'static str, n: usize },
    #[error("invalid {name} ({value}): {reason}")]
    Parameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },
}
type Result<T> = std::result::Result<T, ValidationError>;

pub(crate) fn min_planes(nz: usize, min: usize) -> Result<()> {
    if nz < min {
        Err(ValidationError::TooFewPlanes { nz, min })
    } else {
        Ok(())
    }
}

pub(crate) fn min_pixels(axis: &'static str, n: usize, min: usize) -> Result<()> {
    if n < min {
        Err(ValidationError::TooFewPixels { axis, n, min })
    } else {
        Ok(())
    }
}

pub(crate) fn power_of_two(axis: &'static str, n: usize) -> Result<()> {
    if n.is_power_of_two() {
        Ok(())
    } else {
        Err(ValidationError::NotPowerOfTwo { axis, n })
    }
}

pub(crate) fn positive(name: &'static str, value: f64) -> Result<()> {
    if value > 0. && value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::Parameter {
            name,
            value,
            reason: "must be a positive number",
        })
    }
}

pub(crate) fn finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::Parameter {
            name,
            value,
            reason: "must be a finite number",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powers_of_two() {
        assert!(power_of_two("nx", 64).is_ok());
        assert_eq!(
            power_of_two("ny", 48),
            Err(ValidationError::NotPowerOfTwo { axis: "ny", n: 48 })
        );
    }

    #[test]
    fn error_messages() {
        let err = min_planes(2, 3).unwrap_err();
        assert_eq!(err.to_string(), "nz should be at least 3, found 2");
        assert!(positive("ni", f64::NAN).is_err());
    }
}
