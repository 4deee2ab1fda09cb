//! Survey session lifecycle and boundary mapping tests

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use shared::{
    mapping_token_expiry, next_sequence_number, parse_polygon, parse_sequence_number,
    progress_percent, validate_polygon, BoundaryError, MappingTokenState, SessionStatus,
    SessionSummary,
};

// =============================================================================
// Session status transitions
// =============================================================================

mod session_lifecycle {
    use super::*;

    const ALL: [SessionStatus; 4] = [
        SessionStatus::NotStarted,
        SessionStatus::InProgress,
        SessionStatus::Completed,
        SessionStatus::Abandoned,
    ];

    #[test]
    fn only_open_sessions_accept_observations() {
        assert!(SessionStatus::NotStarted.is_active());
        assert!(SessionStatus::InProgress.is_active());
        assert!(!SessionStatus::Completed.is_active());
        assert!(!SessionStatus::Abandoned.is_active());
    }

    #[test]
    fn first_observation_starts_the_session() {
        assert_eq!(
            SessionStatus::NotStarted.on_observation(),
            SessionStatus::InProgress
        );
        assert_eq!(
            SessionStatus::InProgress.on_observation(),
            SessionStatus::InProgress
        );
    }

    #[test]
    fn open_sessions_can_finish_or_be_abandoned() {
        for from in [SessionStatus::NotStarted, SessionStatus::InProgress] {
            assert_eq!(from.transition_to(SessionStatus::Completed), Ok(SessionStatus::Completed));
            assert_eq!(from.transition_to(SessionStatus::Abandoned), Ok(SessionStatus::Abandoned));
        }
    }

    #[test]
    fn ended_sessions_cannot_change() {
        let err = SessionStatus::Completed
            .transition_to(SessionStatus::Abandoned)
            .unwrap_err();
        assert_eq!(err, "Session is already marked as completed.");

        let err = SessionStatus::Abandoned
            .transition_to(SessionStatus::Completed)
            .unwrap_err();
        assert_eq!(err, "Session is already marked as abandoned.");
    }

    #[test]
    fn sessions_cannot_move_back_to_open() {
        assert!(SessionStatus::InProgress
            .transition_to(SessionStatus::NotStarted)
            .is_err());
    }

    #[test]
    fn only_open_sessions_can_be_deleted() {
        for status in ALL {
            assert_eq!(status.can_delete(), status.is_active(), "{}", status);
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in ALL {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
        assert!("paused".parse::<SessionStatus>().is_err());
    }
}

// =============================================================================
// Observation numbering and progress
// =============================================================================

mod observations {
    use super::*;

    #[test]
    fn sequence_numbers_ignore_junk() {
        assert_eq!(parse_sequence_number(Some(" 12 ")), Some(12));
        assert_eq!(parse_sequence_number(Some("")), None);
        assert_eq!(parse_sequence_number(Some("tree 4")), None);
        assert_eq!(parse_sequence_number(Some("-3")), None);
        assert_eq!(parse_sequence_number(None), None);
    }

    #[test]
    fn next_plant_follows_the_highest() {
        assert_eq!(next_sequence_number(None), 1);
        assert_eq!(next_sequence_number(Some(41)), 42);
    }

    #[test]
    fn progress_without_target_is_zero() {
        assert_eq!(progress_percent(10, None), 0);
        assert_eq!(progress_percent(10, Some(0)), 0);
    }

    #[test]
    fn summary_mentions_target_and_findings() {
        let summary = SessionSummary {
            farm_name: "Berry Springs Block".to_string(),
            completed_observations: 61,
            target_plants: Some(122),
            unique_pests_count: 2,
            unique_diseases_count: 1,
            duration_minutes: Some(95),
        };
        let text = summary.describe();
        assert!(text.contains("61 plant(s) on Berry Springs Block"));
        assert!(text.contains("50% of target 122"));
        assert!(text.contains("95 min"));
        assert!(text.contains("2 pest type(s) and 1 disease type(s)"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Progress stays within 0..=100 whatever the counts
        #[test]
        fn prop_progress_clamped(completed in 0i64..100_000, target in proptest::option::of(-10i32..10_000)) {
            let pct = progress_percent(completed, target);
            prop_assert!((0..=100).contains(&pct));
        }

        /// Reaching the target reports 100%
        #[test]
        fn prop_target_reached_is_complete(target in 1i32..10_000, extra in 0i64..1_000) {
            prop_assert_eq!(progress_percent(target as i64 + extra, Some(target)), 100);
        }

        /// Numbers assigned after any existing maximum are unique and positive
        #[test]
        fn prop_next_sequence_exceeds_max(max in proptest::option::of(0i32..1_000_000)) {
            let next = next_sequence_number(max);
            prop_assert!(next >= 1);
            prop_assert!(next > max.unwrap_or(0));
        }
    }
}

// =============================================================================
// Boundary mapping
// =============================================================================

mod boundary_mapping {
    use super::*;

    fn ring(points: usize) -> serde_json::Value {
        let coords: Vec<[f64; 2]> = (0..points)
            .map(|i| [131.0 + i as f64 * 0.001, -12.5])
            .collect();
        json!({ "type": "Polygon", "coordinates": [coords] })
    }

    #[test]
    fn closed_ring_is_accepted() {
        assert!(validate_polygon(&ring(4)).is_ok());
        assert!(validate_polygon(&ring(12)).is_ok());
    }

    #[test]
    fn short_ring_is_rejected() {
        assert_eq!(validate_polygon(&ring(3)), Err(BoundaryError::InvalidPolygon));
    }

    #[test]
    fn wrong_shapes_are_rejected() {
        let cases = [
            json!({ "type": "LineString", "coordinates": [[131.0, -12.5], [131.1, -12.5]] }),
            json!({ "type": "Polygon", "coordinates": [] }),
            json!({ "type": "Polygon" }),
            json!([1, 2, 3]),
        ];
        for case in cases {
            assert_eq!(validate_polygon(&case), Err(BoundaryError::InvalidPolygon), "{}", case);
        }
    }

    #[test]
    fn submitted_text_is_parsed() {
        assert_eq!(parse_polygon(""), Err(BoundaryError::Missing));
        assert_eq!(parse_polygon("{"), Err(BoundaryError::Malformed));
        assert!(parse_polygon(&ring(5).to_string()).is_ok());
        assert_eq!(parse_polygon("[]"), Err(BoundaryError::InvalidPolygon));
    }

    #[test]
    fn links_expire_after_a_day() {
        let issued = Utc.with_ymd_and_hms(2024, 10, 1, 9, 0, 0).unwrap();
        let expires = mapping_token_expiry(issued);
        assert_eq!(expires - issued, Duration::hours(24));

        assert_eq!(
            MappingTokenState::at(expires, issued + Duration::hours(23)),
            MappingTokenState::Valid
        );
        assert_eq!(MappingTokenState::at(expires, expires), MappingTokenState::Expired);
    }
}
