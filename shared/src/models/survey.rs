//! Survey session and observation models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a survey session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "not_started",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    /// Observations can only be recorded while the session is active
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::NotStarted | SessionStatus::InProgress)
    }

    /// Completed and abandoned sessions are kept as history
    pub fn can_delete(&self) -> bool {
        self.is_active()
    }

    /// Status after the first observation is saved
    pub fn on_observation(self) -> SessionStatus {
        match self {
            SessionStatus::NotStarted => SessionStatus::InProgress,
            other => other,
        }
    }

    /// Move to a terminal status, rejecting sessions that already ended
    pub fn transition_to(self, target: SessionStatus) -> Result<SessionStatus, String> {
        if !self.is_active() {
            return Err(format!("Session is already marked as {}.", self.as_str()));
        }
        match target {
            SessionStatus::Completed | SessionStatus::Abandoned => Ok(target),
            _ => Err(format!(
                "Cannot move session from {} to {}",
                self.as_str(),
                target.as_str()
            )),
        }
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(SessionStatus::NotStarted),
            "in_progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "abandoned" => Ok(SessionStatus::Abandoned),
            other => Err(format!("Unknown session status: {}", other)),
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an observation is still being edited
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    Draft,
    Completed,
}

impl ObservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationStatus::Draft => "draft",
            ObservationStatus::Completed => "completed",
        }
    }
}

impl std::str::FromStr for ObservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ObservationStatus::Draft),
            "completed" => Ok(ObservationStatus::Completed),
            other => Err(format!("Unknown observation status: {}", other)),
        }
    }
}

/// Share of the target already inspected, clamped to 0..=100
pub fn progress_percent(completed: i64, target: Option<i32>) -> i32 {
    match target {
        Some(target) if target > 0 => {
            let pct = completed.saturating_mul(100) / target as i64;
            pct.clamp(0, 100) as i32
        }
        _ => 0,
    }
}

/// Parse a client-supplied plant sequence number; blanks and junk become `None`
pub fn parse_sequence_number(raw: Option<&str>) -> Option<i32> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<i32>().ok())
        .filter(|n| *n > 0)
}

/// Next plant number within a session
pub fn next_sequence_number(current_max: Option<i32>) -> i32 {
    current_max.unwrap_or(0).max(0) + 1
}

/// Whole minutes between start and end, if the session has ended
pub fn duration_minutes(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Option<i64> {
    end.map(|end| (end - start).num_minutes().max(0))
}

/// Summary of a finished session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub farm_name: String,
    pub completed_observations: i64,
    pub target_plants: Option<i32>,
    pub unique_pests_count: i64,
    pub unique_diseases_count: i64,
    pub duration_minutes: Option<i64>,
}

impl SessionSummary {
    /// One-line description shown after finishing a session
    pub fn describe(&self) -> String {
        let mut text = format!(
            "Surveyed {} plant(s) on {}",
            self.completed_observations, self.farm_name
        );
        if let Some(target) = self.target_plants {
            text.push_str(&format!(
                " ({}% of target {})",
                progress_percent(self.completed_observations, Some(target)),
                target
            ));
        }
        if let Some(minutes) = self.duration_minutes {
            text.push_str(&format!(" in {} min", minutes));
        }
        text.push('.');
        if self.unique_pests_count == 0 && self.unique_diseases_count == 0 {
            text.push_str(" No pests or diseases found.");
        } else {
            text.push_str(&format!(
                " Found {} pest type(s) and {} disease type(s).",
                self.unique_pests_count, self.unique_diseases_count
            ));
        }
        text
    }
}

/// An observation placed on the session map
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapPoint {
    pub observation_id: Uuid,
    pub lat: Decimal,
    pub lon: Decimal,
    pub time: DateTime<Utc>,
    pub pests: Vec<String>,
    pub diseases: Vec<String>,
    pub has_image: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_status_activity() {
        assert!(SessionStatus::NotStarted.is_active());
        assert!(SessionStatus::InProgress.is_active());
        assert!(!SessionStatus::Completed.is_active());
        assert!(!SessionStatus::Abandoned.can_delete());
    }

    #[test]
    fn test_session_transitions() {
        assert_eq!(
            SessionStatus::InProgress.transition_to(SessionStatus::Completed),
            Ok(SessionStatus::Completed)
        );
        assert_eq!(
            SessionStatus::NotStarted.transition_to(SessionStatus::Abandoned),
            Ok(SessionStatus::Abandoned)
        );
        let err = SessionStatus::Completed
            .transition_to(SessionStatus::Completed)
            .unwrap_err();
        assert_eq!(err, "Session is already marked as completed.");
        assert!(SessionStatus::InProgress
            .transition_to(SessionStatus::NotStarted)
            .is_err());
    }

    #[test]
    fn test_first_observation_starts_session() {
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
    fn test_status_parsing() {
        assert_eq!("in_progress".parse::<SessionStatus>(), Ok(SessionStatus::InProgress));
        assert!("paused".parse::<SessionStatus>().is_err());
        assert_eq!("draft".parse::<ObservationStatus>(), Ok(ObservationStatus::Draft));
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, Some(100)), 0);
        assert_eq!(progress_percent(61, Some(122)), 50);
        assert_eq!(progress_percent(200, Some(122)), 100);
        assert_eq!(progress_percent(5, None), 0);
        assert_eq!(progress_percent(5, Some(0)), 0);
    }

    #[test]
    fn test_sequence_numbers() {
        assert_eq!(parse_sequence_number(Some("12")), Some(12));
        assert_eq!(parse_sequence_number(Some("  ")), None);
        assert_eq!(parse_sequence_number(Some("tree-4")), None);
        assert_eq!(parse_sequence_number(Some("0")), None);
        assert_eq!(parse_sequence_number(None), None);
        assert_eq!(next_sequence_number(None), 1);
        assert_eq!(next_sequence_number(Some(7)), 8);
    }

    #[test]
    fn test_duration_minutes() {
        let start = Utc.with_ymd_and_hms(2024, 1, 5, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 5, 9, 45, 30).unwrap();
        assert_eq!(duration_minutes(start, Some(end)), Some(105));
        assert_eq!(duration_minutes(start, None), None);
    }

    #[test]
    fn test_summary_text() {
        let summary = SessionSummary {
            farm_name: "Katherine Block A".into(),
            completed_observations: 61,
            target_plants: Some(122),
            unique_pests_count: 2,
            unique_diseases_count: 0,
            duration_minutes: Some(90),
        };
        assert_eq!(
            summary.describe(),
            "Surveyed 61 plant(s) on Katherine Block A (50% of target 122) in 90 min. \
             Found 2 pest type(s) and 0 disease type(s)."
        );
    }

    #[test]
    fn test_summary_clean_survey() {
        let summary = SessionSummary {
            farm_name: "North".into(),
            completed_observations: 3,
            target_plants: None,
            unique_pests_count: 0,
            unique_diseases_count: 0,
            duration_minutes: None,
        };
        assert_eq!(summary.describe(), "Surveyed 3 plant(s) on North. No pests or diseases found.");
    }
}
