//! Window frame computation: a monotonic deque for O(1)-amortized min/max
//! and incremental prefix sums for sum/avg/variance/stddev, so a full
//! partition scan costs O(n) regardless of frame size.

use std::collections::VecDeque;

use super::ast::{FrameStart, WindowFuncKind};

fn window_start(i: usize, frame_start: &FrameStart) -> usize {
    match frame_start {
        FrameStart::UnboundedPreceding => 0,
        FrameStart::Preceding(n) => i.saturating_sub(*n as usize),
    }
}

/// `ROW_NUMBER()` ignores the frame entirely: 1-based position within the
/// (already partitioned and ordered) slice.
pub fn row_number(len: usize) -> Vec<f64> {
    (1..=len).map(|n| n as f64).collect()
}

/// Computes one window value per position in `values`, using the frame
/// `[window_start(i), i]` for each `i`. `values` is already restricted to
/// one partition and sorted by the window's `ORDER BY`.
pub fn compute(values: &[f64], frame_start: &FrameStart, func: WindowFuncKind) -> Vec<f64> {
    match func {
        WindowFuncKind::RowNumber => row_number(values.len()),
        WindowFuncKind::Count => (0..values.len()).map(|i| (i - window_start(i, frame_start) + 1) as f64).collect(),
        WindowFuncKind::Sum => prefix_reduce(values, frame_start, |sum, _n| sum),
        WindowFuncKind::Avg => prefix_reduce(values, frame_start, |sum, n| sum / n as f64),
        WindowFuncKind::Min => monotonic(values, frame_start, true),
        WindowFuncKind::Max => monotonic(values, frame_start, false),
        WindowFuncKind::Variance => variance(values, frame_start),
        WindowFuncKind::Stddev => variance(values, frame_start).into_iter().map(f64::sqrt).collect(),
    }
}

fn prefix_reduce(values: &[f64], frame_start: &FrameStart, reduce: impl Fn(f64, usize) -> f64) -> Vec<f64> {
    let mut prefix = vec![0.0; values.len() + 1];
    for (i, &v) in values.iter().enumerate() {
        prefix[i + 1] = prefix[i] + v;
    }
    (0..values.len())
        .map(|i| {
            let start = window_start(i, frame_start);
            let sum = prefix[i + 1] - prefix[start];
            reduce(sum, i - start + 1)
        })
        .collect()
}

/// Sample variance over each frame: `max(0, (sumSq - n*mean^2) / (n-1))`,
/// using the actual frame length for the first `w-1` rows of a bounded
/// window rather than treating them as undefined.
fn variance(values: &[f64], frame_start: &FrameStart) -> Vec<f64> {
    let mut prefix_sum = vec![0.0; values.len() + 1];
    let mut prefix_sq = vec![0.0; values.len() + 1];
    for (i, &v) in values.iter().enumerate() {
        prefix_sum[i + 1] = prefix_sum[i] + v;
        prefix_sq[i + 1] = prefix_sq[i] + v * v;
    }
    (0..values.len())
        .map(|i| {
            let start = window_start(i, frame_start);
            let n = i - start + 1;
            if n <= 1 {
                return 0.0;
            }
            let sum = prefix_sum[i + 1] - prefix_sum[start];
            let sum_sq = prefix_sq[i + 1] - prefix_sq[start];
            let mean = sum / n as f64;
            ((sum_sq - n as f64 * mean * mean) / (n as f64 - 1.0)).max(0.0)
        })
        .collect()
}

/// Monotonic-deque sliding min/max: `min_mode = true` for min, `false` for max.
fn monotonic(values: &[f64], frame_start: &FrameStart, min_mode: bool) -> Vec<f64> {
    let mut deque: VecDeque<usize> = VecDeque::new();
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let start = window_start(i, frame_start);
        while let Some(&front) = deque.front() {
            if front < start {
                deque.pop_front();
            } else {
                break;
            }
        }
        while let Some(&back) = deque.back() {
            let dominated = if min_mode { values[back] >= values[i] } else { values[back] <= values[i] };
            if dominated {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back(i);
        out.push(values[*deque.front().unwrap()]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_number_is_one_based_position() {
        assert_eq!(row_number(3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn sum_matches_naive_window_sum() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let got = compute(&values, &FrameStart::Preceding(1), WindowFuncKind::Sum);
        assert_eq!(got, vec![1.0, 3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn unbounded_min_max_are_running_extremes() {
        let values = [3.0, 1.0, 4.0, 1.0, 5.0];
        let min = compute(&values, &FrameStart::UnboundedPreceding, WindowFuncKind::Min);
        let max = compute(&values, &FrameStart::UnboundedPreceding, WindowFuncKind::Max);
        assert_eq!(min, vec![3.0, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(max, vec![3.0, 3.0, 4.0, 4.0, 5.0]);
    }

    #[test]
    fn constant_column_has_zero_variance_and_stddev() {
        let values = [7.0; 10];
        let var = compute(&values, &FrameStart::UnboundedPreceding, WindowFuncKind::Variance);
        let std = compute(&values, &FrameStart::UnboundedPreceding, WindowFuncKind::Stddev);
        assert!(var.iter().all(|&v| v.abs() < 1e-9));
        assert!(std.iter().all(|&v| v.abs() < 1e-9));
    }

    #[test]
    fn single_row_frame_has_zero_variance() {
        let values = [5.0];
        let var = compute(&values, &FrameStart::UnboundedPreceding, WindowFuncKind::Variance);
        assert_eq!(var, vec![0.0]);
    }

    #[test]
    fn sliding_max_matches_brute_force() {
        let values = [5.0, 3.0, 8.0, 1.0, 9.0, 2.0, 7.0];
        let frame = FrameStart::Preceding(2);
        let got = compute(&values, &frame, WindowFuncKind::Max);
        let expected: Vec<f64> = (0..values.len())
            .map(|i| {
                let start = i.saturating_sub(2);
                values[start..=i].iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            })
            .collect();
        assert_eq!(got, expected);
    }
}
