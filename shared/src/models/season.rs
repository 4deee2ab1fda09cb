//! Seasonal stage models
//!
//! Each month of the year maps to a farming stage carrying the assumed pest
//! prevalence and the pests, diseases and plant parts worth checking.

use serde::{Deserialize, Serialize};

/// Stage information resolved for a month
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeasonalStageInfo {
    pub stage_name: String,
    /// Assumed prevalence (0..1)
    pub prevalence_p: f64,
    pub month_used: u32,
    pub pest_names: Vec<String>,
    pub disease_names: Vec<String>,
    pub part_names: Vec<String>,
}

struct DefaultStage {
    name: &'static str,
    months: &'static [u32],
    prevalence: f64,
    pests: &'static [&'static str],
    diseases: &'static [&'static str],
    parts: &'static [&'static str],
}

const DEFAULT_STAGES: &[DefaultStage] = &[
    DefaultStage {
        name: "Flowering",
        months: &[6, 7, 8],
        prevalence: 0.05,
        pests: &["Mango Leaf Hopper", "Mango Tip Borer"],
        diseases: &["Powdery Mildew", "Mango Malformation"],
        parts: &["Flowers", "Leaves", "Branches"],
    },
    DefaultStage {
        name: "Fruit Development",
        months: &[9, 10, 11, 12],
        prevalence: 0.07,
        pests: &["Mango Fruit Fly", "Mango Seed Weevil", "Mango Scale Insect"],
        diseases: &["Anthracnose", "Bacterial Black Spot", "Stem End Rot"],
        parts: &["Fruits", "Leaves", "Branches"],
    },
    DefaultStage {
        name: "Wet Season",
        months: &[1, 2, 3, 4],
        prevalence: 0.10,
        pests: &[
            "Mango Fruit Fly",
            "Mango Seed Weevil",
            "Mango Tip Borer",
            "Mango Scale Insect",
        ],
        diseases: &["Anthracnose", "Bacterial Black Spot"],
        parts: &["Fruits", "Leaves", "Stems"],
    },
    DefaultStage {
        name: "Dry Season",
        months: &[5],
        prevalence: 0.02,
        pests: &["Mango Leaf Hopper", "Mango Tip Borer", "Mango Scale Insect"],
        diseases: &["Powdery Mildew", "Mango Malformation"],
        parts: &["Stems", "Branches"],
    },
];

/// Stage used when a month matches nothing (highest general risk)
const FALLBACK_STAGE: &str = "Wet Season";

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

impl DefaultStage {
    fn info(&self, month: u32) -> SeasonalStageInfo {
        SeasonalStageInfo {
            stage_name: self.name.to_string(),
            prevalence_p: self.prevalence,
            month_used: month,
            pest_names: owned(self.pests),
            disease_names: owned(self.diseases),
            part_names: owned(self.parts),
        }
    }
}

/// Built-in stage for a month
pub fn default_stage_for_month(month: u32) -> SeasonalStageInfo {
    DEFAULT_STAGES
        .iter()
        .find(|stage| stage.months.contains(&month))
        .or_else(|| DEFAULT_STAGES.iter().find(|stage| stage.name == FALLBACK_STAGE))
        .map(|stage| stage.info(month))
        .unwrap_or_else(|| SeasonalStageInfo {
            stage_name: FALLBACK_STAGE.to_string(),
            prevalence_p: 0.10,
            month_used: month,
            pest_names: Vec::new(),
            disease_names: Vec::new(),
            part_names: Vec::new(),
        })
}

/// Parse a comma-separated month list such as `"6, 7,8"`.
///
/// Blank or non-numeric entries and months outside 1..=12 are skipped.
pub fn parse_months(months: &str) -> Vec<u32> {
    months
        .split(',')
        .filter_map(|m| m.trim().parse::<u32>().ok())
        .filter(|m| (1..=12).contains(m))
        .collect()
}

/// Month selected for a request: a valid override or the current month.
///
/// The second element carries a warning when an override was given but ignored.
pub fn resolve_month(override_month: Option<&str>, current_month: u32) -> (u32, Option<String>) {
    let Some(raw) = override_month else {
        return (current_month, None);
    };
    let cleaned = raw.trim();
    match cleaned.parse::<u32>() {
        Ok(month) if (1..=12).contains(&month) => (month, None),
        Ok(_) => (
            current_month,
            Some(format!(
                "Invalid month ({}) ignored. Using current system month.",
                cleaned
            )),
        ),
        Err(_) => (
            current_month,
            Some(format!(
                "Could not parse month ('{}'), ignored. Using current system month.",
                cleaned
            )),
        ),
    }
}

/// A stage definition as stored, used to build the yearly timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub months: String,
    pub prevalence_p: f64,
}

/// One month of the yearly stage timeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTimelineEntry {
    pub month: u32,
    pub month_name: &'static str,
    pub stage_name: Option<String>,
    pub prevalence_percent: Option<f64>,
    pub is_current: bool,
}

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// English name of a month (1-based)
pub fn month_name(month: u32) -> Option<&'static str> {
    month
        .checked_sub(1)
        .and_then(|idx| MONTH_NAMES.get(idx as usize).copied())
}

/// Build the 12-month timeline; earlier definitions win when months overlap.
pub fn stage_timeline(stages: &[StageDefinition], current_month: u32) -> Vec<StageTimelineEntry> {
    (1..=12u32)
        .map(|month| {
            let stage = stages
                .iter()
                .find(|s| parse_months(&s.months).contains(&month));
            StageTimelineEntry {
                month,
                month_name: MONTH_NAMES[(month - 1) as usize],
                stage_name: stage.map(|s| s.name.clone()),
                prevalence_percent: stage.map(|s| (s.prevalence_p * 10000.0).round() / 100.0),
                is_current: month == current_month,
            }
        })
        .collect()
}

/// Built-in stages as definitions, for deployments with an empty stage table
pub fn default_stage_definitions() -> Vec<StageDefinition> {
    DEFAULT_STAGES
        .iter()
        .map(|stage| StageDefinition {
            name: stage.name.to_string(),
            months: stage
                .months
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(","),
            prevalence_p: stage.prevalence,
        })
        .collect()
}
