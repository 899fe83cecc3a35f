//! Error metric used to compare a candidate against the reference.

/// Relative error of `actual` against `reference`.
///
/// The denominator is floored at the smallest normal `f32`, so a zero
/// reference degrades gracefully into an absolute-error comparison instead
/// of dividing by zero.
#[inline]
pub fn relative_error(reference: f32, actual: f32) -> f32 {
    (reference - actual).abs() / f32::MIN_POSITIVE.max(reference.abs())
}

/// Largest elementwise [`relative_error`] between two equal-length sequences.
///
/// The fold starts at 0.0. A NaN element error (for example an output element
/// the candidate never wrote) makes the result NaN, which never compares
/// below an error limit.
///
/// # Panics
///
/// Panics if the sequences differ in length.
pub fn max_error(reference: &[f32], actual: &[f32]) -> f32 {
    assert_eq!(
        reference.len(),
        actual.len(),
        "reference/actual length mismatch: {} vs {}",
        reference.len(),
        actual.len()
    );
    reference.iter().zip(actual).map(|(&r, &a)| relative_error(r, a)).fold(0.0f32, nan_max)
}

#[inline]
pub(crate) fn nan_max(acc: f32, error: f32) -> f32 {
    if acc.is_nan() || error.is_nan() { f32::NAN } else { acc.max(error) }
}

/// Median of the samples, reordering them in place.
///
/// Returns the element at index `len / 2` of the sorted order, which is the
/// upper of the two middle values when the count is even. NaN samples sort
/// above every number. Returns `None` for an empty slice.
pub fn median(samples: &mut [f32]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    let mid = samples.len() / 2;
    let (_, value, _) = samples.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_error_of_equal_values_is_zero() {
        for x in [1.0f32, -3.5, 1e-30, 7e30, f32::MIN_POSITIVE] {
            assert_eq!(relative_error(x, x), 0.0);
        }
        assert_eq!(relative_error(0.0, 0.0), 0.0);
    }

    #[test]
    fn relative_error_scales_by_reference() {
        assert!((relative_error(2.0, 2.5) - 0.25).abs() < 1e-7);
        assert!((relative_error(-4.0, -3.0) - 0.25).abs() < 1e-7);
    }

    #[test]
    fn zero_reference_uses_min_positive_floor() {
        let err = relative_error(0.0, f32::MIN_POSITIVE);
        assert_eq!(err, 1.0);
    }

    #[test]
    fn nan_actual_yields_nan() {
        assert!(relative_error(1.0, f32::NAN).is_nan());
    }

    #[test]
    fn max_error_of_identical_sequences_is_zero() {
        let values = [0.5f32, -0.1, 0.0, 0.9];
        assert_eq!(max_error(&values, &values), 0.0);
        assert_eq!(max_error(&[], &[]), 0.0);
    }

    #[test]
    fn max_error_poisoned_by_nan_anywhere() {
        let reference = [1.0f32, 2.0, 3.0, 4.0];
        for poisoned in 0..reference.len() {
            let mut actual = reference;
            actual[poisoned] = f32::NAN;
            assert!(max_error(&reference, &actual).is_nan(), "NaN at {poisoned} was masked");
        }
    }

    #[test]
    #[should_panic(expected = "length mismatch")]
    fn max_error_rejects_length_mismatch() {
        max_error(&[1.0, 2.0], &[1.0]);
    }

    #[test]
    fn median_of_odd_set_is_sorted_middle() {
        let mut samples = [5.0f32, 1.0, 4.0, 2.0, 3.0];
        assert_eq!(median(&mut samples), Some(3.0));
    }

    #[test]
    fn median_of_single_sample_is_unchanged() {
        let mut samples = [0.125f32];
        assert_eq!(median(&mut samples), Some(0.125));
    }

    #[test]
    fn median_of_even_set_is_upper_middle() {
        let mut samples = [4.0f32, 1.0, 3.0, 2.0];
        assert_eq!(median(&mut samples), Some(3.0));
    }

    #[test]
    fn median_orders_signed_samples_by_value() {
        let mut samples = [-5.0f32, 1.0, 2.0];
        assert_eq!(median(&mut samples), Some(1.0));

        let mut samples = [3.0f32, -0.5, -4.0, 0.25];
        assert_eq!(median(&mut samples), Some(0.25));
    }

    #[test]
    fn median_of_empty_set_is_none() {
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn median_tolerates_minority_nan() {
        let mut samples = [f32::NAN, 1e-7, 2e-7];
        assert_eq!(median(&mut samples), Some(2e-7));

        let mut samples = [f32::NAN, f32::NAN, 2e-7];
        assert!(median(&mut samples).unwrap().is_nan());
    }
}
