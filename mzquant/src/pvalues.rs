//! Benjamini-Hochberg multiple testing correction.

use std::cmp::Ordering;

/// Adjust a batch of p-values with the Benjamini-Hochberg monotone step-up
/// procedure, controlling the false discovery rate across the batch.
///
/// The adjusted value at index `i` corresponds to the raw value at index
/// `i`; input order is preserved so callers can write the adjusted values
/// back onto their results. Every adjusted value is at least its raw value
/// and at most 1, and the adjusted values are non-decreasing when the raw
/// values are sorted ascending.
pub fn adjust_p_values(p_values: &[f64]) -> Vec<f64> {
    let count = p_values.len();
    let mut order: Vec<usize> = (0..count).collect();
    // Walk from the largest p-value down, keeping a running minimum so the
    // adjusted values stay monotone.
    order.sort_by(|a, b| {
        p_values[*b]
            .partial_cmp(&p_values[*a])
            .unwrap_or(Ordering::Equal)
    });
    let mut adjusted = vec![0.0; count];
    let mut running = 1.0_f64;
    for (position, index) in order.into_iter().enumerate() {
        let rank = count - position;
        running = running.min(p_values[index] * count as f64 / rank as f64);
        adjusted[index] = running;
    }
    adjusted
}
