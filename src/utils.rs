//! Shared level conversions.

/// Floor of every dB value. Anything at or below it is silence.
pub const MINUS_INF_IN_DB: f64 = -200.0;

const LIN_TO_DB_FACTOR: f64 = 20.0 / std::f64::consts::LN_10;
const DB_TO_LIN_FACTOR: f64 = std::f64::consts::LN_10 / 20.0;

// -------------------------------------------------------------------------------------------------

pub fn linear_to_db(value: f64) -> f64 {
    if value == 1.0 {
        return 0.0; // avoid rounding errors at exactly 0 dB
    } else if value > 1e-10 {
        return (value.ln() * LIN_TO_DB_FACTOR).max(MINUS_INF_IN_DB);
    }
    MINUS_INF_IN_DB
}

// -------------------------------------------------------------------------------------------------

pub fn db_to_linear(value: f64) -> f64 {
    if value == 0.0 {
        return 1.0; // avoid rounding errors at exactly 0 dB
    } else if value > MINUS_INF_IN_DB {
        return (value * DB_TO_LIN_FACTOR).exp();
    }
    0.0
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_conversion() {
        assert_eq!(linear_to_db(0.0), MINUS_INF_IN_DB);
        assert_eq!(linear_to_db(1.0), 0.0);
        assert_eq!(db_to_linear(MINUS_INF_IN_DB), 0.0);
        assert_eq!(db_to_linear(0.0), 1.0);
        assert!((linear_to_db(db_to_linear(20.0)) - 20.0).abs() < 1e-9);
        assert!((linear_to_db(db_to_linear(-20.0)) + 20.0).abs() < 1e-9);
        assert!((db_to_linear(-6.0) - 0.501187).abs() < 1e-6);
    }
}
