#[cfg(test)]
mod interpolation_tests {
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    use crate::constants::SpeciesParams;
    use crate::errors::CalibrationError;
    use crate::grid::{Coord, GridSnapshot};
    use crate::interpolation::*;
    use crate::species::{FieldId, FieldKind, Species};

    fn tune_field() -> FieldId {
        Species::Betu.field(FieldKind::Tune)
    }

    fn grid(values: Vec<f64>) -> GridSnapshot {
        let time = NaiveDate::from_ymd_opt(2024, 4, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let lat = vec![46.0, 46.0, 47.0, 47.5];
        let lon = vec![7.0, 8.0, 8.0, 9.5];
        let mut grid = GridSnapshot::new(lat, lon, time).unwrap();
        grid.insert_field(tune_field().storage_key(), values).unwrap();
        grid
    }

    #[test]
    fn test_single_station_sets_every_point() {
        let grid = grid(vec![1.0, 2.0, 0.5, 3.0]);
        let stations = [Coord::new(46.3, 7.7)];
        let bounds = ClampBounds::new(0.222, 4.046);

        let out = interpolate(&[1.5], &grid, tune_field(), &stations, CombineMode::Multiply, bounds)
            .unwrap();
        assert_relative_eq!(out[0], 1.5, max_relative = 1e-12);
        assert_relative_eq!(out[1], 3.0, max_relative = 1e-12);
        assert_relative_eq!(out[2], 0.75, max_relative = 1e-12);
        // 4.5 is clamped to the upper bound.
        assert_eq!(out[3], 4.046);
    }

    #[test]
    fn test_coincident_station_dominates() {
        let grid = grid(vec![10.0, 10.0, 10.0, 10.0]);
        // The first station sits on grid point 1, the second far away.
        let stations = [Coord::new(46.0, 8.0), Coord::new(60.0, 30.0)];

        let out = interpolate(
            &[-4.0, 100.0],
            &grid,
            tune_field(),
            &stations,
            CombineMode::Sum,
            ClampBounds::unbounded(),
        )
        .unwrap();
        assert_relative_eq!(out[1], 6.0, epsilon = 1e-9);
        assert!(out[1] < 10.0);

        let out = interpolate(
            &[0.5, 2.0],
            &grid,
            tune_field(),
            &stations,
            CombineMode::Multiply,
            ClampBounds::tune(&SpeciesParams::defaults(Species::Betu)),
        )
        .unwrap();
        assert_relative_eq!(out[1], 5.0_f64.min(4.046), epsilon = 1e-9);
    }

    #[test]
    fn test_weights_fall_off_with_distance() {
        let grid = grid(vec![0.0; 4]);
        let stations = [Coord::new(46.0, 7.0), Coord::new(47.5, 9.5)];
        let out = interpolate(
            &[1.0, -1.0],
            &grid,
            tune_field(),
            &stations,
            CombineMode::Sum,
            ClampBounds::unbounded(),
        )
        .unwrap();
        // Point 1 is closer to the first station, point 2 to the second.
        assert!(out[1] > 0.0);
        assert!(out[2] < 0.0);
        assert!(out.iter().all(|v| v.abs() <= 1.0 + 1e-12));
    }

    #[test]
    fn test_sum_mode_is_additive() {
        let grid = grid(vec![100.0, 200.0, 300.0, 400.0]);
        let stations = [Coord::new(46.5, 8.0), Coord::new(47.0, 9.0)];
        let out = interpolate(
            &[-25.0, -25.0],
            &grid,
            tune_field(),
            &stations,
            CombineMode::Sum,
            ClampBounds::unbounded(),
        )
        .unwrap();
        for (new, old) in out.iter().zip([100.0, 200.0, 300.0, 400.0]) {
            assert_relative_eq!(*new, old - 25.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_clamp_keeps_nan_base_values() {
        let grid = grid(vec![f64::NAN, 2.0, 1.0, 1.0]);
        let stations = [Coord::new(46.0, 7.0)];
        let out = interpolate(&[3.0], &grid, tune_field(), &stations, CombineMode::Sum, ClampBounds::unbounded())
            .unwrap();
        assert!(out[0].is_nan());
        assert_relative_eq!(out[1], 5.0, epsilon = 1e-9);

        let bounds = ClampBounds::tune(&SpeciesParams::defaults(Species::Betu));
        assert!(bounds.apply(f64::NAN).is_nan());
        assert_eq!(bounds.apply(10.0), 4.046);
        assert_eq!(bounds.apply(0.0), 0.222);
    }

    #[test]
    fn test_value_count_must_match_stations() {
        let grid = grid(vec![1.0; 4]);
        let err = interpolate(
            &[1.0],
            &grid,
            tune_field(),
            &[Coord::new(46.0, 7.0), Coord::new(47.0, 8.0)],
            CombineMode::Multiply,
            ClampBounds::unbounded(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CalibrationError::StationCountMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_base_field() {
        let grid = grid(vec![1.0; 4]);
        let err = interpolate(
            &[1.0],
            &grid,
            Species::Alnu.field(FieldKind::Tune),
            &[Coord::new(46.0, 7.0)],
            CombineMode::Multiply,
            ClampBounds::unbounded(),
        )
        .unwrap_err();
        assert!(matches!(err, CalibrationError::MissingMandatoryFields { .. }));
    }
}
