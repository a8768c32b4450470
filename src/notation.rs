//! SI-prefixed readouts for frequency and amplitude labels.

const SUB_MULTIPLES: [&str; 9] = ["", "m", "µ", "n", "p", "f", "a", "z", "y"];
const MULTIPLES: [&str; 9] = ["", "k", "M", "G", "T", "P", "E", "Z", "Y"];
const MAX_STEPS: usize = 8;

/// Scale `value` by powers of 1000 into `[1, 1000]` and return it with the
/// matching SI prefix.
///
/// At most eight scaling steps are taken, so zero (and values too small to
/// reach 1) stop at the last prefix. The result is truncated toward zero to
/// two decimal digits, not rounded.
///
/// # Example
///
/// ```
/// use sdrscope::notation::to_notation_unit;
///
/// let (value, unit) = to_notation_unit(96_900_000.0);
/// assert_eq!(unit, "M");
/// assert!((value - 96.9).abs() < 1e-4);
/// ```
pub fn to_notation_unit(value: f32) -> (f32, &'static str) {
    let mut counter = 0;
    let mut value = value;

    let unit = if value < 1.0 {
        while value < 1.0 {
            counter += 1;
            value *= 1e3;
            if counter == MAX_STEPS {
                break;
            }
        }
        SUB_MULTIPLES[counter]
    } else {
        while value > 1000.0 {
            counter += 1;
            value /= 1e3;
            if counter == MAX_STEPS {
                break;
            }
        }
        MULTIPLES[counter]
    };

    ((value * 1e2).trunc() / 1e2, unit)
}

/// Frequency label as drawn on the spectrum grid, e.g. `96.90 MHz`.
pub fn format_frequency(hz: f64) -> String {
    let (value, unit) = to_notation_unit(hz as f32);
    format!("{:.2} {}Hz", value, unit)
}
