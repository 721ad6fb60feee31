pub mod breakdown;
pub mod comparison;
pub mod records;
pub mod series;
pub mod trend;

/// Round to 2 decimal places, the precision every aggregate is reported at.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Abbreviated month names indexed by month number minus one.
pub(crate) const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub(crate) fn month_label(month: u32) -> &'static str {
    MONTH_NAMES[(month as usize - 1) % 12]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert!((round2(1.2345) - 1.23).abs() < f64::EPSILON);
        assert!((round2(33.333_333) - 33.33).abs() < f64::EPSILON);
        assert!(round2(0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_month_label() {
        assert_eq!(month_label(1), "Jan");
        assert_eq!(month_label(12), "Dec");
    }
}
