//! Currency helpers.
//!
//! Amounts are carried as `f64` at full precision through every calculation
//! and only rounded when shown to a person or compared for balance.

/// Half a sen. Two amounts closer than this are the same once displayed.
pub const CENT_TOLERANCE: f64 = 0.005;

/// Clamps user input to a usable non-negative amount. NaN, infinities and
/// negatives all become zero.
pub fn sanitize_amount(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Lenient parse of a typed amount. Anything that is not a number is zero,
/// thousands separators and an `RM` prefix are accepted.
pub fn parse_amount(input: &str) -> f64 {
    let cleaned: String = input
        .trim()
        .trim_start_matches("RM")
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().map(sanitize_amount).unwrap_or(0.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn is_zero(value: f64) -> bool {
    value.abs() < CENT_TOLERANCE
}

pub fn amounts_equal(a: f64, b: f64) -> bool {
    is_zero(a - b)
}

/// `a > b` once both are rounded to the sen.
pub fn exceeds(a: f64, b: f64) -> bool {
    round2(a) > round2(b)
}

/// Formats as `RM 12,345.60`.
pub fn format_rm(value: f64) -> String {
    let rounded = round2(value);
    let negative = rounded < 0.0;
    let fixed = format!("{:.2}", rounded.abs());
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}RM {}.{}", if negative { "-" } else { "" }, grouped, frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_amount() {
        assert_eq!(sanitize_amount(-5.0), 0.0);
        assert_eq!(sanitize_amount(f64::NAN), 0.0);
        assert_eq!(sanitize_amount(f64::INFINITY), 0.0);
        assert_eq!(sanitize_amount(12.5), 12.5);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("10000"), 10000.0);
        assert_eq!(parse_amount("RM 1,250.50"), 1250.5);
        assert_eq!(parse_amount("abc"), 0.0);
        assert_eq!(parse_amount("-20"), 0.0);
        assert_eq!(parse_amount(""), 0.0);
    }

    #[test]
    fn test_format_rm() {
        assert_eq!(format_rm(0.0), "RM 0.00");
        assert_eq!(format_rm(19550.0), "RM 19,550.00");
        assert_eq!(format_rm(1173.456), "RM 1,173.46");
        assert_eq!(format_rm(999.999), "RM 1,000.00");
        assert_eq!(format_rm(-42.1), "-RM 42.10");
    }

    #[test]
    fn test_tolerance_helpers() {
        assert!(amounts_equal(0.1 + 0.2, 0.3));
        assert!(is_zero(0.004));
        assert!(!is_zero(0.01));
        assert!(exceeds(100.01, 100.0));
        assert!(!exceeds(100.0 + 1e-9, 100.0));
        assert!(!exceeds(100.004, 100.0));
        assert!(exceeds(100.006, 100.0));
        assert!(!exceeds(2550.0000000000005, 2550.0));
    }
}
