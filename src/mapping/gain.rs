//! Gain grid.
//!
//! Gains are edited in decibels on a non-uniform grid that is finer near
//! unity than at the extremes:
//!
//! | Range (dB)  | Step |
//! |-------------|------|
//! | [-12, 12]   | 0.5  |
//! | [-24, -12)  | 1    |
//! | [-48, -24)  | 2    |
//! | [-96, -48)  | 4    |

pub const MIN_DB: f32 = -96.0;
pub const MAX_DB: f32 = 12.0;

/// Snap a gain to the grid, rounding half up within its sub-range.
pub fn quantize_db(db: f32) -> f32 {
    if db.is_nan() {
        return 0.0;
    }
    if db >= MAX_DB {
        return MAX_DB;
    }
    if db >= -12.0 {
        return (db * 2.0 + 0.5).floor() / 2.0;
    }
    if db >= -24.0 {
        return (db + 0.5).floor();
    }
    if db >= -48.0 {
        return (db / 2.0 + 0.5).floor() * 2.0;
    }
    if db >= MIN_DB {
        return (db / 4.0 + 0.5).floor() * 4.0;
    }
    MIN_DB
}

/// One grid step up, clamped at +12 dB.
pub fn increment_db(db: f32) -> f32 {
    let db = quantize_db(db);
    if db >= MAX_DB {
        MAX_DB
    } else if db >= -12.0 {
        db + 0.5
    } else if db >= -24.0 {
        db + 1.0
    } else if db >= -48.0 {
        db + 2.0
    } else {
        db + 4.0
    }
}

/// One grid step down, clamped at -96 dB.
///
/// A value sitting exactly on a range boundary steps with the coarser grid
/// below it, so that `decrement(increment(x)) == x` away from the clamps.
pub fn decrement_db(db: f32) -> f32 {
    let db = quantize_db(db);
    if db > -12.0 {
        db - 0.5
    } else if db > -24.0 {
        db - 1.0
    } else if db > -48.0 {
        db - 2.0
    } else if db > MIN_DB {
        db - 4.0
    } else {
        MIN_DB
    }
}

/// Step size of the sub-range a quantized value lies in.
pub fn step_at(db: f32) -> f32 {
    if db >= -12.0 {
        0.5
    } else if db >= -24.0 {
        1.0
    } else if db >= -48.0 {
        2.0
    } else {
        4.0
    }
}

pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        MIN_DB
    } else {
        20.0 * linear.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_quantize_table() {
        assert_eq!(quantize_db(0.2), 0.0);
        assert_eq!(quantize_db(0.25), 0.5);
        assert_eq!(quantize_db(-12.0), -12.0);
        assert_eq!(quantize_db(-12.3), -12.0);
        assert_eq!(quantize_db(-17.4), -17.0);
        assert_eq!(quantize_db(-17.6), -18.0);
        assert_eq!(quantize_db(-30.9), -30.0);
        assert_eq!(quantize_db(-31.0), -30.0);
        assert_eq!(quantize_db(-50.0), -48.0);
        assert_eq!(quantize_db(-95.0), -96.0);
        assert_eq!(quantize_db(40.0), 12.0);
        assert_eq!(quantize_db(-200.0), -96.0);
    }

    #[test]
    fn test_boundary_steps() {
        assert_eq!(increment_db(-12.0), -11.5);
        assert_eq!(decrement_db(-11.5), -12.0);
        assert_eq!(decrement_db(-12.0), -13.0);
        assert_eq!(increment_db(-13.0), -12.0);
        assert_eq!(decrement_db(-24.0), -26.0);
        assert_eq!(increment_db(-26.0), -24.0);
        assert_eq!(decrement_db(-48.0), -52.0);
        assert_eq!(increment_db(-52.0), -48.0);
    }

    #[test]
    fn test_clamps() {
        assert_eq!(increment_db(12.0), 12.0);
        assert_eq!(decrement_db(12.0), 11.5);
        assert_eq!(decrement_db(-96.0), -96.0);
        assert_eq!(increment_db(-96.0), -92.0);
    }

    #[test]
    fn test_thirty_step_pairs_return_to_unity() {
        let mut db = 0.0;
        for _ in 0..30 {
            db = increment_db(db);
            db = decrement_db(db);
        }
        assert_eq!(db, 0.0);
    }

    #[test]
    fn test_walk_to_ceiling_and_back() {
        let mut db = 0.0;
        for _ in 0..24 {
            db = increment_db(db);
        }
        assert_eq!(db, 12.0);
        for _ in 0..24 {
            db = decrement_db(db);
        }
        assert_eq!(db, 0.0);
    }

    #[test]
    fn test_full_sweep_visits_every_grid_point() {
        let mut db = MIN_DB;
        let mut points = vec![db];
        while db < MAX_DB {
            db = increment_db(db);
            points.push(db);
        }
        // 12 steps of 4, 12 of 2, 12 of 1, 48 of 0.5
        assert_eq!(points.len(), 1 + 12 + 12 + 12 + 48);
        let mut back = MAX_DB;
        for expected in points.iter().rev().skip(1) {
            back = decrement_db(back);
            assert_eq!(back, *expected);
        }
    }

    #[test]
    fn test_linear_conversion() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-6.0) - 0.501).abs() < 1e-3);
        assert!((linear_to_db(db_to_linear(-12.5)) + 12.5).abs() < 1e-4);
        assert_eq!(linear_to_db(0.0), MIN_DB);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        #[test]
        fn quantize_is_idempotent(db in -120.0f32..=30.0f32) {
            let q = quantize_db(db);
            prop_assert_eq!(quantize_db(q), q);
        }

        #[test]
        fn quantize_lands_on_grid(db in -120.0f32..=30.0f32) {
            let q = quantize_db(db);
            prop_assert!((MIN_DB..=MAX_DB).contains(&q));
            let step = step_at(q);
            prop_assert_eq!((q / step).fract(), 0.0, "{} is off the {} dB grid", q, step);
        }

        #[test]
        fn increment_then_decrement_round_trips(db in -96.0f32..12.0f32) {
            let q = quantize_db(db);
            prop_assume!(q < MAX_DB);
            prop_assert_eq!(decrement_db(increment_db(q)), q);
        }

        #[test]
        fn decrement_then_increment_round_trips(db in -95.0f32..=12.0f32) {
            let q = quantize_db(db);
            prop_assume!(q > MIN_DB);
            prop_assert_eq!(increment_db(decrement_db(q)), q);
        }
    }
}
