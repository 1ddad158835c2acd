use crate::models::Color;

/// Number of LEDs allowed to differ between two sequences still considered
/// identical
pub const LED_TOLERANCE: usize = 2;

/// Compare two LED color sequences, tolerating capture noise
///
/// Sequences of different lengths are never duplicates.
pub fn is_duplicate(a: &[Color], b: &[Color]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter()
        .zip(b.iter())
        .filter(|(a, b)| a != b)
        .take(LED_TOLERANCE + 1)
        .count()
        <= LED_TOLERANCE
}
