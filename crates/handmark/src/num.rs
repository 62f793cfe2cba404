//! Numeric helpers.

use std::cmp::Ordering;

/// `f32` wrapper ordered by [`f32::total_cmp`], usable as a sort key.
#[derive(Debug, Clone, Copy)]
pub struct TotalF32(pub f32);

impl PartialEq for TotalF32 {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// The logistic function, mapping raw network scores to `0.0..=1.0`.
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_midpoint() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
    }

    #[test]
    fn total_order_sorts_descending() {
        let mut v = vec![0.2, 0.9, 0.5];
        v.sort_by_key(|&f| std::cmp::Reverse(TotalF32(f)));
        assert_eq!(v, [0.9, 0.5, 0.2]);
    }
}
