use crate::CoreError;

pub fn ensure_finite(v: f64, what: &'static str) -> Result<f64, CoreError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(CoreError::NonFinite { what, value: v })
    }
}

/// Check that `[min, max]` is a usable closed interval of finite values.
pub fn ensure_bounds(min: f64, max: f64, what: &'static str) -> Result<(), CoreError> {
    ensure_finite(min, what)?;
    ensure_finite(max, what)?;
    if min > max {
        return Err(CoreError::InvalidBounds { what, min, max });
    }
    Ok(())
}

/// Clamp `v` into `[min, max]` and report whether clamping happened.
///
/// Bounds must already have passed [`ensure_bounds`].
pub fn saturate(v: f64, min: f64, max: f64) -> (f64, bool) {
    if v < min {
        (min, true)
    } else if v > max {
        (max, true)
    } else {
        (v, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_finite_detects_nan() {
        let err = ensure_finite(f64::NAN, "test").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Non-finite"));
    }

    #[test]
    fn ensure_bounds_rejects_inverted_interval() {
        assert!(ensure_bounds(0.0, 1.0, "range").is_ok());
        assert!(ensure_bounds(1.0, 1.0, "range").is_ok());
        assert_eq!(
            ensure_bounds(2.0, 1.0, "range"),
            Err(CoreError::InvalidBounds {
                what: "range",
                min: 2.0,
                max: 1.0
            })
        );
        assert!(ensure_bounds(f64::NEG_INFINITY, 1.0, "range").is_err());
    }

    #[test]
    fn saturate_reports_clamping() {
        assert_eq!(saturate(0.5, 0.0, 1.0), (0.5, false));
        assert_eq!(saturate(-3.0, 0.0, 1.0), (0.0, true));
        assert_eq!(saturate(3.0, 0.0, 1.0), (1.0, true));
        assert_eq!(saturate(1.0, 0.0, 1.0), (1.0, false));
    }
}
