#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Euclidean,
    Manhattan,
}

impl Metric {
    /// Calculate distance. LOWER is ALWAYS closer/better.
    /// Returns the true (non-squared) distance so results can be reported
    /// to callers directly.
    #[inline]
    pub fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
            Metric::Manhattan => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Euclidean => write!(f, "euclidean"),
            Metric::Manhattan => write!(f, "manhattan"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn euclidean_is_true_distance() {
        let a = [0.0, 0.0, 0.0];
        let b = [3.0, 4.0, 0.0];
        assert_eq!(Metric::Euclidean.distance(&a, &b), 5.0);
    }

    #[test]
    fn manhattan_sums_absolute_differences() {
        let a = [1.0, -2.0];
        let b = [4.0, 2.0];
        assert_eq!(Metric::Manhattan.distance(&a, &b), 7.0);
    }

    #[test]
    fn identical_points_are_at_zero() {
        let a = [1.5, 2.5, -3.0];
        assert_eq!(Metric::Euclidean.distance(&a, &a), 0.0);
        assert_eq!(Metric::Manhattan.distance(&a, &a), 0.0);
    }
}
