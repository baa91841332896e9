use std::cmp::Ordering;
use std::error::Error;
use std::fmt;

/// InputValueError is used if some simulation option or parameter does not fulfill the posed
/// requirements, e.g., a lane width that is not positive or a spawn range that is empty.
#[derive(Debug, Clone)]
pub struct InputValueError {
    pub parameter: String,
    pub reason: String,
}

impl InputValueError {
    pub fn new(parameter: &str, reason: &str) -> InputValueError {
        InputValueError {
            parameter: parameter.to_owned(),
            reason: reason.to_owned(),
        }
    }
}

impl fmt::Display for InputValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invalid input value for {}: {}", self.parameter, self.reason)
    }
}

impl Error for InputValueError {}

/// argmax returns the index of the maximum value in the array x. On ties the first index wins.
pub fn argmax<T: std::cmp::PartialOrd + std::marker::Copy>(x: &[T]) -> usize {
    let mut idx_max = 0;
    let mut val_max = x[0];

    for (i, &val) in x.iter().enumerate().skip(1) {
        if val > val_max {
            val_max = val;
            idx_max = i;
        }
    }

    idx_max
}

/// argmin returns the index of the minimum value in the array x. On ties the first index wins.
pub fn argmin<T: std::cmp::PartialOrd + std::marker::Copy>(x: &[T]) -> usize {
    let mut idx_min = 0;
    let mut val_min = x[0];

    for (i, &val) in x.iter().enumerate().skip(1) {
        if val < val_min {
            val_min = val;
            idx_min = i;
        }
    }

    idx_min
}

#[derive(Debug, Clone, Copy)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// argsort returns the indices that would sort an array. The sort is stable, incomparable values
/// (NaN) are treated as equal.
pub fn argsort<T: std::cmp::PartialOrd>(x: &[T], order: SortOrder) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..x.len()).collect();
    match order {
        SortOrder::Ascending => {
            indices.sort_by(|&a, &b| x[a].partial_cmp(&x[b]).unwrap_or(Ordering::Equal))
        }
        SortOrder::Descending => {
            indices.sort_by(|&a, &b| x[b].partial_cmp(&x[a]).unwrap_or(Ordering::Equal))
        }
    }
    indices
}

/// lin_interp returns the linearly interpolated value at x for given discrete data points xp, fp.
/// xp must be increasing. Values outside of xp are clamped to the first/last value of fp.
/// Inspired by numpy.interp.
pub fn lin_interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    if xp.len() != fp.len() {
        panic!("Number of items in xp and fp must be equal!")
    }

    if x <= xp[0] {
        return fp[0];
    }

    for i in 1..xp.len() {
        if x <= xp[i] {
            if xp[i] == xp[i - 1] {
                return fp[i];
            }
            return fp[i - 1] + (x - xp[i - 1]) * (fp[i] - fp[i - 1]) / (xp[i] - xp[i - 1]);
        }
    }

    fp[fp.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5, 0.1]), 1);
        assert_eq!(argmin(&[3.0, 1.0, 1.0]), 1);
    }

    #[test]
    fn argsort_orders_indices() {
        let x = [3.0, 1.0, 2.0];
        assert_eq!(argsort(&x, SortOrder::Ascending), vec![1, 2, 0]);
        assert_eq!(argsort(&x, SortOrder::Descending), vec![0, 2, 1]);
    }

    #[test]
    fn lin_interp_builds_trapezoids() {
        let xp = [0.0, 10.0, 20.0, 30.0];
        let fp = [0.0, 1.0, 1.0, 0.0];
        assert_eq!(lin_interp(-5.0, &xp, &fp), 0.0);
        assert_eq!(lin_interp(5.0, &xp, &fp), 0.5);
        assert_eq!(lin_interp(15.0, &xp, &fp), 1.0);
        assert_eq!(lin_interp(35.0, &xp, &fp), 0.0);
    }

    #[test]
    fn lin_interp_handles_vertical_shoulders() {
        let xp = [0.0, 0.0, 10.0];
        let fp = [1.0, 1.0, 0.0];
        assert_eq!(lin_interp(0.0, &xp, &fp), 1.0);
        assert_eq!(lin_interp(5.0, &xp, &fp), 0.5);
    }
}
