use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::model::{
    AttendanceRecord, Branch, FULL_MARK, Improvements, Player, RatingsSummary, ReportCard,
    SCHEMA_VERSION, Stat, StatGroup, Target, UNASSIGNED_TEAM_ID, mean_rounded, round1,
    stat_template,
};

// Legacy rows were written with skills on 0-100 and scores on 0-10. Each field is rescaled on
// its own magnitude, so a row can be partially upgraded and still converge.
const SCALE_MAX: f64 = 5.0;
const SKILL_LEGACY_DIVISOR: f64 = 20.0;
const SCORE_LEGACY_DIVISOR: f64 = 2.0;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPlayer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub branch: Option<Branch>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub jersey_number: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub access_code: Option<String>,
    #[serde(default)]
    pub report_cards: Option<Vec<RawReportCard>>,
    #[serde(default)]
    pub schema_version: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReportCard {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub season: String,
    #[serde(default)]
    pub quarter: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub author_coach_id: Option<String>,
    #[serde(default)]
    pub author_coach_name: Option<String>,
    #[serde(default)]
    pub attendance: Option<RawAttendance>,
    #[serde(default)]
    pub stats: Vec<RawStat>,
    #[serde(default)]
    pub strengths: Option<Vec<String>>,
    #[serde(default)]
    pub improvements: Option<Value>,
    #[serde(default)]
    pub ratings_summary: Option<RawRatings>,
    #[serde(default)]
    pub final_summary: Option<String>,
    #[serde(default)]
    pub coach_footer_note: Option<String>,
    #[serde(default)]
    pub targets: Option<Vec<Target>>,
    #[serde(default)]
    pub overall_rating: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStat {
    pub name: String,
    #[serde(default)]
    pub group: Option<StatGroup>,
    #[serde(default)]
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAttendance {
    #[serde(default)]
    pub attendance_score: f64,
    #[serde(default)]
    pub commitment_score: f64,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRatings {
    #[serde(default)]
    pub application_score: f64,
    #[serde(default)]
    pub behaviour_score: f64,
    #[serde(default)]
    pub coach_comment: String,
}

/// Parses a stored player blob of any schema age and upgrades it to the current one.
pub fn sanitize_value(raw: Value) -> Result<Player> {
    let raw: RawPlayer = serde_json::from_value(raw).context("player blob does not parse")?;
    Ok(sanitize_player(raw))
}

/// Runs a typed player back through the sanitizer. Useful after hand edits.
pub fn resanitize(player: &Player) -> Result<Player> {
    let value = serde_json::to_value(player).context("serialize player")?;
    sanitize_value(value)
}

/// Sanitizes a batch of blobs. Rows that fail to parse are skipped and reported.
pub fn sanitize_all(rows: Vec<Value>) -> (Vec<Player>, Vec<String>) {
    let mut players = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();
    for row in rows {
        let id = row
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();
        match sanitize_value(row) {
            Ok(player) => players.push(player),
            Err(err) => errors.push(format!("player {id}: {err:#}")),
        }
    }
    (players, errors)
}

pub fn sanitize_player(raw: RawPlayer) -> Player {
    let branch = raw.branch.unwrap_or_default();
    let team_id = if branch.uses_team() {
        Some(
            raw.team_id
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNASSIGNED_TEAM_ID.to_string()),
        )
    } else {
        None
    };
    let jersey_number = match branch {
        Branch::Academy => raw
            .jersey_number
            .filter(|n| n.is_finite() && *n >= 0.0)
            .map(|n| n.round() as u32),
        Branch::Coaching | Branch::TechCentre => None,
    };

    Player {
        id: raw.id,
        name: raw.name,
        branch,
        team_id,
        position: raw.position.unwrap_or_default(),
        jersey_number,
        image_url: raw.image_url.unwrap_or_default(),
        access_code: raw.access_code.unwrap_or_default(),
        report_cards: raw
            .report_cards
            .unwrap_or_default()
            .into_iter()
            .map(sanitize_report)
            .collect(),
        schema_version: SCHEMA_VERSION,
    }
}

fn sanitize_report(raw: RawReportCard) -> ReportCard {
    let stats: Vec<Stat> = raw.stats.into_iter().map(sanitize_stat).collect();
    let overall_rating = match raw.overall_rating {
        Some(v) if v.is_finite() && v > SCALE_MAX => {
            round1(v / SKILL_LEGACY_DIVISOR).clamp(0.0, SCALE_MAX)
        }
        Some(v) if v.is_finite() => v.max(0.0),
        _ => {
            let values: Vec<u8> = stats.iter().map(|s| s.value).collect();
            mean_rounded(&values).unwrap_or(0.0)
        }
    };

    let attendance = raw
        .attendance
        .map(|a| AttendanceRecord {
            attendance_score: rescale_score(a.attendance_score),
            commitment_score: rescale_score(a.commitment_score),
            note: a.note,
        })
        .unwrap_or_else(|| AttendanceRecord {
            attendance_score: 4,
            commitment_score: 4,
            note: String::new(),
        });
    let ratings_summary = raw
        .ratings_summary
        .map(|r| RatingsSummary {
            application_score: rescale_score(r.application_score),
            behaviour_score: rescale_score(r.behaviour_score),
            coach_comment: r.coach_comment,
        })
        .unwrap_or_else(|| RatingsSummary {
            application_score: 4,
            behaviour_score: 4,
            coach_comment: String::new(),
        });

    ReportCard {
        id: raw.id,
        season: raw.season,
        quarter: raw.quarter,
        date: raw.date,
        author_coach_id: raw.author_coach_id,
        author_coach_name: raw.author_coach_name,
        attendance,
        stats,
        strengths: raw.strengths.unwrap_or_default(),
        improvements: improvements_from_value(raw.improvements),
        ratings_summary,
        final_summary: raw.final_summary.unwrap_or_default(),
        coach_footer_note: raw.coach_footer_note.unwrap_or_default(),
        targets: raw.targets.unwrap_or_default(),
        overall_rating,
    }
}

fn sanitize_stat(raw: RawStat) -> Stat {
    let group = raw.group.unwrap_or_else(|| group_for_skill(&raw.name));
    Stat {
        value: rescale_skill(raw.value),
        name: raw.name,
        group,
        full_mark: FULL_MARK,
    }
}

pub fn rescale_skill(value: f64) -> u8 {
    rescale(value, SKILL_LEGACY_DIVISOR)
}

pub fn rescale_score(value: f64) -> u8 {
    rescale(value, SCORE_LEGACY_DIVISOR)
}

fn rescale(value: f64, divisor: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    let scaled = if value > SCALE_MAX { value / divisor } else { value };
    scaled.round().clamp(0.0, SCALE_MAX) as u8
}

fn group_for_skill(name: &str) -> StatGroup {
    stat_template()
        .find(|(_, skill)| skill.eq_ignore_ascii_case(name))
        .map(|(group, _)| group)
        .unwrap_or(StatGroup::Technical)
}

// Early cards stored improvements as a plain list of strings.
fn improvements_from_value(value: Option<Value>) -> Improvements {
    match value {
        Some(Value::Object(map)) => Improvements {
            key_area: string_field(map.get("keyArea")),
            build_on_area: string_field(map.get("buildOnArea")),
        },
        Some(Value::Array(items)) => Improvements {
            key_area: string_field(items.first()),
            build_on_area: string_field(items.get(1)),
        },
        Some(Value::String(s)) => Improvements {
            key_area: s,
            build_on_area: String::new(),
        },
        _ => Improvements::default(),
    }
}

fn string_field(value: Option<&Value>) -> String {
    value
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_rules() {
        assert_eq!(rescale_skill(80.0), 4);
        assert_eq!(rescale_skill(4.0), 4);
        assert_eq!(rescale_skill(5.0), 5);
        assert_eq!(rescale_skill(6.0), 0);
        assert_eq!(rescale_score(8.0), 4);
        assert_eq!(rescale_score(9.0), 5);
        assert_eq!(rescale_score(3.0), 3);
    }

    #[test]
    fn improvements_accepts_list_form() {
        let imp = improvements_from_value(Some(serde_json::json!(["a", "b"])));
        assert_eq!(imp.key_area, "a");
        assert_eq!(imp.build_on_area, "b");
    }
}
