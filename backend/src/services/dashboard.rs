//! Grower dashboard and survey record overview

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::farm::{FarmService, FarmSummary};
use crate::services::season::{current_month, SeasonService};
use crate::services::survey::{SessionListItem, SurveyService};
use shared::{month_name, SeasonalStageInfo, SessionStatus};

#[derive(Clone)]
pub struct DashboardService {
    db: PgPool,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub farm_count: usize,
    pub total_plants: i64,
    pub completed_sessions: i64,
    pub latest_completed_session: Option<SessionListItem>,
    pub recent_sessions: Vec<SessionListItem>,
    pub farms_due: Vec<FarmSummary>,
    pub current_month: String,
    pub current_stage: SeasonalStageInfo,
}

/// Completed sessions of one farm
#[derive(Debug, Serialize)]
pub struct FarmRecords {
    pub farm_id: Uuid,
    pub farm_name: String,
    pub session_count: usize,
    pub distinct_pests: i64,
    pub sessions: Vec<SessionListItem>,
}

impl DashboardService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn dashboard(&self, user_id: Uuid, grower_id: Uuid) -> AppResult<Dashboard> {
        let farms = FarmService::new(self.db.clone())
            .list_farms(grower_id)
            .await?;
        let total_plants = farms.iter().filter_map(|f| f.total_plants).sum();
        let farm_count = farms.len();

        let surveys = SurveyService::new(self.db.clone());
        let recent_sessions = surveys.sessions_for_user(user_id, None, Some(5)).await?;
        let latest_completed_session = surveys
            .sessions_for_user(user_id, Some(SessionStatus::Completed), Some(1))
            .await?
            .into_iter()
            .next();

        let completed_sessions = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM survey_sessions WHERE surveyor_id = $1 AND status = 'completed'",
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        let month = current_month();
        let current_stage = SeasonService::new(self.db.clone())
            .stage_for_month(month)
            .await?;

        Ok(Dashboard {
            farm_count,
            total_plants,
            completed_sessions,
            latest_completed_session,
            recent_sessions,
            farms_due: farms.into_iter().filter(|f| f.is_due).collect(),
            current_month: month_name(month).unwrap_or_default().to_string(),
            current_stage,
        })
    }

    /// Completed sessions grouped by farm
    pub async fn record_list(&self, user_id: Uuid) -> AppResult<Vec<FarmRecords>> {
        let sessions = SurveyService::new(self.db.clone())
            .sessions_for_user(user_id, Some(SessionStatus::Completed), None)
            .await?;

        let pest_counts: HashMap<Uuid, i64> = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT s.farm_id, COUNT(DISTINCT x.pest_id)
            FROM survey_sessions s
            JOIN observations o ON o.session_id = s.id AND o.status = 'completed'
            JOIN observation_pests x ON x.observation_id = o.id
            WHERE s.surveyor_id = $1 AND s.status = 'completed'
            GROUP BY s.farm_id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .collect();

        Ok(group_by_farm(sessions, &pest_counts))
    }
}

/// Group sessions by farm, keeping the order farms first appear in
fn group_by_farm(
    sessions: Vec<SessionListItem>,
    pest_counts: &HashMap<Uuid, i64>,
) -> Vec<FarmRecords> {
    let mut groups: Vec<FarmRecords> = Vec::new();
    for item in sessions {
        let farm_id = item.session.farm_id;
        match groups.iter_mut().find(|g| g.farm_id == farm_id) {
            Some(group) => {
                group.session_count += 1;
                group.sessions.push(item);
            }
            None => groups.push(FarmRecords {
                farm_id,
                farm_name: item.farm_name.clone(),
                session_count: 1,
                distinct_pests: pest_counts.get(&farm_id).copied().unwrap_or(0),
                sessions: vec![item],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::survey::SurveySession;
    use chrono::Utc;

    fn item(farm_id: Uuid, farm_name: &str) -> SessionListItem {
        let now = Utc::now();
        SessionListItem {
            session: SurveySession {
                id: Uuid::new_v4(),
                farm_id,
                surveyor_id: Uuid::new_v4(),
                status: "completed".to_string(),
                start_time: now,
                end_time: Some(now),
                target_plants_surveyed: Some(122),
                notes: None,
                created_at: now,
                updated_at: now,
            },
            farm_name: farm_name.to_string(),
            observation_count: 10,
        }
    }

    #[test]
    fn test_group_by_farm_counts_sessions() {
        let north = Uuid::new_v4();
        let south = Uuid::new_v4();
        let sessions = vec![item(north, "North Block"), item(south, "South Block"), item(north, "North Block")];
        let pest_counts = HashMap::from([(north, 3)]);

        let groups = group_by_farm(sessions, &pest_counts);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].farm_name, "North Block");
        assert_eq!(groups[0].session_count, 2);
        assert_eq!(groups[0].distinct_pests, 3);
        assert_eq!(groups[1].session_count, 1);
        assert_eq!(groups[1].distinct_pests, 0);
    }

    #[test]
    fn test_group_by_farm_empty() {
        assert!(group_by_farm(Vec::new(), &HashMap::new()).is_empty());
    }
}
