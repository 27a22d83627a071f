use rand::Rng;
use serde::{Deserialize, Serialize};

/// Current on-the-wire schema for stored player blobs. Rows without a version are legacy.
pub const SCHEMA_VERSION: u32 = 2;

pub const UNASSIGNED_TEAM_ID: &str = "Unassigned";
pub const FULL_MARK: u8 = 5;
pub const DEFAULT_SEASON: &str = "2025/26";
pub const DEFAULT_QUARTER: &str = "Winter Term";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Branch {
    #[default]
    Academy,
    Coaching,
    TechCentre,
}

impl Branch {
    pub fn uses_team(self) -> bool {
        matches!(self, Branch::Academy | Branch::TechCentre)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatGroup {
    Technical,
    Tactical,
    Physical,
    Psychological,
}

pub const STAT_GROUPS: [StatGroup; 4] = [
    StatGroup::Technical,
    StatGroup::Tactical,
    StatGroup::Physical,
    StatGroup::Psychological,
];

const TECHNICAL: &[&str] = &[
    "Ball Mastery",
    "1v1 Attacking",
    "1v1 Defending",
    "First Touch",
    "Ball Striking",
    "Passing Technique",
    "Non-Dominant Foot",
];
const TACTICAL: &[&str] = &[
    "Scanning/Awareness",
    "Movement off Ball",
    "Pos. In Possession",
    "Pos. Out Possession",
    "Decision Making",
];
const PHYSICAL: &[&str] = &["Speed/Acceleration", "Agility & Balance", "Strength", "Endurance"];
const PSYCHOLOGICAL: &[&str] = &[
    "Focus",
    "Confidence",
    "Coachability",
    "Resilience",
    "Teamwork",
    "Encouraging Others",
];

impl StatGroup {
    pub fn skills(self) -> &'static [&'static str] {
        match self {
            StatGroup::Technical => TECHNICAL,
            StatGroup::Tactical => TACTICAL,
            StatGroup::Physical => PHYSICAL,
            StatGroup::Psychological => PSYCHOLOGICAL,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StatGroup::Technical => "Technical",
            StatGroup::Tactical => "Tactical",
            StatGroup::Physical => "Physical",
            StatGroup::Psychological => "Psychological",
        }
    }
}

/// Every skill in template order, tagged with its group.
pub fn stat_template() -> impl Iterator<Item = (StatGroup, &'static str)> {
    STAT_GROUPS
        .into_iter()
        .flat_map(|group| group.skills().iter().map(move |name| (group, *name)))
}

pub fn stat_template_len() -> usize {
    STAT_GROUPS.iter().map(|g| g.skills().len()).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    pub name: String,
    pub group: StatGroup,
    pub value: u8,
    pub full_mark: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub attendance_score: u8,
    pub commitment_score: u8,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingsSummary {
    pub application_score: u8,
    pub behaviour_score: u8,
    #[serde(default)]
    pub coach_comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Improvements {
    #[serde(default)]
    pub key_area: String,
    #[serde(default)]
    pub build_on_area: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub achieved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub id: String,
    pub season: String,
    pub quarter: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_coach_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_coach_name: Option<String>,
    pub attendance: AttendanceRecord,
    pub stats: Vec<Stat>,
    pub strengths: Vec<String>,
    pub improvements: Improvements,
    pub ratings_summary: RatingsSummary,
    pub final_summary: String,
    pub coach_footer_note: String,
    pub targets: Vec<Target>,
    pub overall_rating: f64,
}

impl ReportCard {
    pub fn group_average(&self, group: StatGroup) -> Option<f64> {
        let values: Vec<u8> = self
            .stats
            .iter()
            .filter(|s| s.group == group)
            .map(|s| s.value)
            .collect();
        mean_rounded(&values)
    }

    pub fn targets_achieved(&self) -> usize {
        self.targets.iter().filter(|t| t.achieved).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub name: String,
    pub branch: Branch,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(default)]
    pub position: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jersey_number: Option<u32>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub access_code: String,
    #[serde(default)]
    pub report_cards: Vec<ReportCard>,
    #[serde(default)]
    pub schema_version: u32,
}

impl Player {
    pub fn latest_report(&self) -> Option<&ReportCard> {
        self.report_cards.first()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Parent,
    #[default]
    Coach,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coach {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub assigned_teams: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Narrative {
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Improvements,
}

/// Mean of 1–5 values rounded to one decimal, `None` for an empty slice.
pub fn mean_rounded(values: &[u8]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: u32 = values.iter().map(|v| u32::from(*v)).sum();
    Some(round1(f64::from(sum) / values.len() as f64))
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Time-ordered id with a random suffix, e.g. `rc-1765380467123-9f3a01`.
pub fn new_id(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("{prefix}-{millis}-{suffix:06x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_has_twenty_two_skills() {
        assert_eq!(stat_template_len(), 22);
        assert_eq!(stat_template().count(), 22);
        assert_eq!(stat_template().next(), Some((StatGroup::Technical, "Ball Mastery")));
    }

    #[test]
    fn branch_serializes_screaming_snake() {
        let raw = serde_json::to_string(&Branch::TechCentre).unwrap();
        assert_eq!(raw, "\"TECH_CENTRE\"");
    }

    #[test]
    fn new_ids_are_prefixed_and_distinct() {
        let a = new_id("rc");
        let b = new_id("rc");
        assert!(a.starts_with("rc-"));
        assert_ne!(a, b);
    }

    #[test]
    fn mean_rounded_handles_empty_and_rounding() {
        assert_eq!(mean_rounded(&[]), None);
        assert_eq!(mean_rounded(&[4, 4, 5]), Some(4.3));
    }
}
