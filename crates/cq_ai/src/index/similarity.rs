/// Squared Euclidean distance, accumulated in f64.
///
/// Callers guarantee equal lengths.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f64 {
    let mut sum = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let d = f64::from(*x) - f64::from(*y);
        sum += d * d;
    }
    sum
}

/// Maps a distance in `[0, inf)` to a similarity in `(0, 1]`; strictly decreasing.
pub fn similarity_from_distance(distance: f64) -> f64 {
    1.0 / (1.0 + distance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_squared_and_symmetric() {
        assert_eq!(squared_l2(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(squared_l2(&[3.0, 4.0], &[0.0, 0.0]), 25.0);
        assert_eq!(squared_l2(&[1.5], &[1.5]), 0.0);
    }

    #[test]
    fn similarity_is_monotonic_in_distance() {
        assert_eq!(similarity_from_distance(0.0), 1.0);
        let mut prev = similarity_from_distance(0.0);
        for d in [0.01, 0.1, 1.0, 10.0, 1e6] {
            let s = similarity_from_distance(d);
            assert!(s < prev && s > 0.0);
            prev = s;
        }
    }
}
