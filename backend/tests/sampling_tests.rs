//! Surveillance sample size tests
//!
//! Checks the finite-population sample size against reference values and
//! its bounds and monotonicity across populations and confidence levels.

use proptest::prelude::*;
use shared::{
    calculate_sample_size, default_stage_for_month, required_sample_size, ConfidenceLevel,
    SamplingError, DEFAULT_MARGIN_OF_ERROR,
};

fn population_strategy() -> impl Strategy<Value = i64> {
    1i64..2_000_000
}

fn prevalence_strategy() -> impl Strategy<Value = f64> {
    0.0f64..=1.0
}

fn confidence_strategy() -> impl Strategy<Value = ConfidenceLevel> {
    prop_oneof![
        Just(80u8),
        Just(85u8),
        Just(90u8),
        Just(95u8),
        Just(99u8),
    ]
    .prop_map(|level| ConfidenceLevel::new(level).unwrap())
}

// =============================================================================
// Reference values
// =============================================================================

mod reference_values {
    use super::*;

    #[test]
    fn thousand_plants_at_95_percent_and_ten_percent_prevalence() {
        let result = calculate_sample_size(Some(1000), ConfidenceLevel::default(), 0.10).unwrap();
        assert_eq!(result.population_size, 1000);
        assert_eq!(result.confidence_level_percent, 95);
        assert_eq!(result.required_plants_to_survey, 122);
        assert_eq!(result.percentage_of_total, 12.2);
        assert_eq!(result.margin_of_error, DEFAULT_MARGIN_OF_ERROR);
    }

    #[test]
    fn wet_season_block_of_two_hectares() {
        // 2 ha at 250 trees/ha in January
        let stage = default_stage_for_month(1);
        let result = calculate_sample_size(Some(500), ConfidenceLevel::default(), stage.prevalence_p).unwrap();
        assert!(result.required_plants_to_survey > 0);
        assert!(result.required_plants_to_survey <= 500);
        assert_eq!(result.prevalence_percent(), 10.0);
    }

    #[test]
    fn missing_population_is_reported() {
        assert_eq!(
            calculate_sample_size(None, ConfidenceLevel::default(), 0.1),
            Err(SamplingError::PopulationUnavailable)
        );
        assert_eq!(
            calculate_sample_size(Some(0), ConfidenceLevel::default(), 0.1),
            Err(SamplingError::PopulationUnavailable)
        );
    }

    #[test]
    fn out_of_range_prevalence_is_rejected() {
        assert!(matches!(
            calculate_sample_size(Some(100), ConfidenceLevel::default(), 1.5),
            Err(SamplingError::InvalidPrevalence(_))
        ));
    }

    #[test]
    fn unsupported_confidence_levels_are_rejected() {
        for level in [0u8, 50, 94, 96, 100] {
            assert_eq!(
                ConfidenceLevel::new(level),
                Err(SamplingError::UnsupportedConfidence(level))
            );
        }
    }

    #[test]
    fn confidence_levels_are_listed_lowest_first() {
        let levels: Vec<u8> = ConfidenceLevel::all().map(|c| c.percent()).collect();
        assert_eq!(levels, vec![80, 85, 90, 95, 99]);
    }
}

// =============================================================================
// Properties
// =============================================================================

mod properties {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Sample size always lies within [1, N]
        #[test]
        fn prop_sample_size_bounded(
            population in population_strategy(),
            prevalence in prevalence_strategy(),
            confidence in confidence_strategy(),
        ) {
            let n = required_sample_size(population, confidence.z_score(), prevalence, DEFAULT_MARGIN_OF_ERROR);
            prop_assert!(n >= 1, "sample size {} below 1", n);
            prop_assert!(n <= population, "sample size {} above population {}", n, population);
        }

        /// Larger farms never need fewer plants inspected
        #[test]
        fn prop_monotone_in_population(
            population in 1i64..1_000_000,
            extra in 0i64..1_000_000,
            prevalence in prevalence_strategy(),
        ) {
            let z = ConfidenceLevel::default().z_score();
            let small = required_sample_size(population, z, prevalence, DEFAULT_MARGIN_OF_ERROR);
            let large = required_sample_size(population + extra, z, prevalence, DEFAULT_MARGIN_OF_ERROR);
            prop_assert!(large >= small, "N={} gave {}, N={} gave {}", population, small, population + extra, large);
        }

        /// Higher confidence never needs fewer plants inspected
        #[test]
        fn prop_monotone_in_confidence(
            population in population_strategy(),
            prevalence in prevalence_strategy(),
        ) {
            let sizes: Vec<i64> = ConfidenceLevel::all()
                .map(|c| required_sample_size(population, c.z_score(), prevalence, DEFAULT_MARGIN_OF_ERROR))
                .collect();
            prop_assert!(sizes.windows(2).all(|w| w[0] <= w[1]), "not monotone: {:?}", sizes);
        }

        /// The percentage reported matches the sample size
        #[test]
        fn prop_percentage_consistent(
            population in population_strategy(),
            prevalence in prevalence_strategy(),
            confidence in confidence_strategy(),
        ) {
            let result = calculate_sample_size(Some(population), confidence, prevalence).unwrap();
            let expected = result.required_plants_to_survey as f64 / population as f64 * 100.0;
            prop_assert!((result.percentage_of_total - expected).abs() <= 0.005 + f64::EPSILON);
            prop_assert!(result.percentage_of_total <= 100.0);
        }
    }
}
