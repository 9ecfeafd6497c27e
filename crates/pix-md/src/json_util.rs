//! Shared parsing helpers used by the venue normalizers.

/// Parse a venue price/size string as `f64`. Empty strings and garbage both
/// yield `None`, which the normalizers turn into a silent drop.
#[inline]
pub fn parse_f64(s: &str) -> Option<f64> {
    fast_float2::parse(s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exchange_decimal_strings() {
        assert_eq!(parse_f64("60000.50"), Some(60000.5));
        assert_eq!(parse_f64("0.00000001"), Some(1e-8));
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert_eq!(parse_f64(""), None);
        assert_eq!(parse_f64("n/a"), None);
    }
}
