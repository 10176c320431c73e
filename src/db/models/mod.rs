pub mod challenge;
pub mod classification;
pub mod post;
pub mod referral;
pub mod user;

/// Rounds a progress quantity to the ledger's fixed precision (four decimal places).
///
/// Fractional weights (e.g. `0.1` per classified item) otherwise drift under repeated
/// addition and can sit just below an integral goal forever.
#[inline]
pub fn normalize_quantity(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_normalize_repeated_tenths() {
        let mut total = 0.0;
        for _ in 0..10 {
            total = normalize_quantity(total + 0.1);
        }
        assert_eq!(total, 1.0);
    }
}
