pub struct Math {}
impl Math {
    pub fn round_float_to_n_decimals(number: f64, decimals: i32) -> f64 {
        let multiplier = 10.0_f64.powi(decimals);
        (number * multiplier).round() / multiplier
    }

    /// milliseconds to seconds with millisecond precision
    pub fn millis_to_seconds(millis: f64) -> f64 {
        Math::round_float_to_n_decimals(millis * 0.001, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_are_rounded_to_three_decimals() {
        assert_eq!(Math::millis_to_seconds(61234.56), 61.235);
        assert_eq!(Math::millis_to_seconds(0.0), 0.0);
    }
}
