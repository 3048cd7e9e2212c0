use std::collections::VecDeque;

use rust_decimal::Decimal;

/// spec.md §4.4.3 / §8: a "train" is two consecutive tick-to-tick deltas that
/// both exceed the threshold. `history` is ordered oldest-first and must
/// already include the newest tick.
pub fn train_detected(history: &VecDeque<Decimal>, threshold: Decimal) -> bool {
    if history.len() < 3 {
        return false;
    }
    let deltas: Vec<Decimal> = history
        .iter()
        .zip(history.iter().skip(1))
        .map(|(prev, cur)| cur - prev)
        .collect();
    if deltas.len() < 2 {
        return false;
    }
    let last_two = &deltas[deltas.len() - 2..];
    last_two[0] > threshold && last_two[1] > threshold
}
