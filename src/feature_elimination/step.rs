//! How many features a round removes

use super::config::Step;

/// Features removable this round without dropping below `min_keep`
pub fn features_to_remove(current: usize, num_to_remove: usize, min_keep: usize) -> usize {
    if current <= min_keep {
        return 0;
    }
    num_to_remove.min(current - min_keep)
}

impl Step {
    /// Requested removal count for `current` active features, before the floor
    pub fn num_features_to_remove(&self, current: usize) -> usize {
        match *self {
            Step::Count(n) => n,
            Step::Fraction(f) => ((f * current as f64).floor() as usize).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_features_to_remove() {
        assert_eq!(features_to_remove(10, 3, 5), 3);
        assert_eq!(features_to_remove(8, 5, 5), 3);
        assert_eq!(features_to_remove(5, 1, 5), 0);
        assert_eq!(features_to_remove(5, 7, 1), 4);
        assert_eq!(features_to_remove(3, 1, 4), 0);
    }

    #[test]
    fn test_fraction_step() {
        assert_eq!(Step::Fraction(0.8).num_features_to_remove(3), 2);
        assert_eq!(Step::Fraction(0.1).num_features_to_remove(5), 1);
        assert_eq!(Step::Fraction(0.5).num_features_to_remove(10), 5);
        assert_eq!(Step::Count(3).num_features_to_remove(2), 3);
    }
}
