use std::fmt;

use chrono::{DateTime, Utc};

use crate::draft::{Draft, MAX_STRENGTHS};
use crate::model::{
    AttendanceRecord, Coach, FULL_MARK, Narrative, Player, RatingsSummary, ReportCard, Stat,
    mean_rounded, stat_template,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    /// Publishing is only possible once a narrative has been generated.
    MissingNarrative,
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssembleError::MissingNarrative => {
                write!(f, "generate the narrative before publishing")
            }
        }
    }
}

impl std::error::Error for AssembleError {}

/// Who is publishing, and when. Kept separate so assembly stays a pure function.
#[derive(Debug, Clone)]
pub struct PublishContext<'a> {
    pub current_coach: &'a Coach,
    pub coaches: &'a [Coach],
    pub now: DateTime<Utc>,
    pub report_id: String,
}

/// Turns a draft and its narrative into a new report card, returning an updated copy of the
/// player with the card at the front of its history.
pub fn assemble(
    draft: &Draft,
    player: &Player,
    narrative: Option<&Narrative>,
    ctx: &PublishContext<'_>,
) -> Result<Player, AssembleError> {
    let narrative = narrative.ok_or(AssembleError::MissingNarrative)?;

    let stats: Vec<Stat> = stat_template()
        .map(|(group, name)| Stat {
            name: name.to_string(),
            group,
            value: draft.stat(name).unwrap_or(0),
            full_mark: FULL_MARK,
        })
        .collect();
    let values: Vec<u8> = stats.iter().map(|s| s.value).collect();
    let overall_rating = mean_rounded(&values).unwrap_or(0.0);

    let strengths = if draft.manual_strengths.is_empty() {
        narrative.strengths.iter().take(MAX_STRENGTHS).cloned().collect()
    } else {
        draft.manual_strengths.clone()
    };

    let author = draft
        .author_coach_id
        .as_deref()
        .and_then(|id| ctx.coaches.iter().find(|c| c.id == id))
        .unwrap_or(ctx.current_coach);

    let card = ReportCard {
        id: ctx.report_id.clone(),
        season: draft.season.clone(),
        quarter: draft.quarter.clone(),
        date: ctx.now.to_rfc3339(),
        author_coach_id: Some(author.id.clone()),
        author_coach_name: Some(author.name.clone()),
        attendance: AttendanceRecord {
            attendance_score: draft.attendance.attendance_score,
            commitment_score: draft.attendance.commitment_score,
            note: draft.attendance.note.clone(),
        },
        stats,
        strengths,
        improvements: narrative.improvements.clone(),
        ratings_summary: RatingsSummary {
            application_score: draft.ratings.application_score,
            behaviour_score: draft.ratings.behaviour_score,
            coach_comment: draft.ratings.coach_comment.clone(),
        },
        final_summary: narrative.summary.clone(),
        coach_footer_note: draft.coach_footer_note.clone(),
        targets: draft.targets.clone(),
        overall_rating,
    };

    let mut report_cards = Vec::with_capacity(player.report_cards.len() + 1);
    report_cards.push(card);
    report_cards.extend(player.report_cards.iter().cloned());
    Ok(Player {
        report_cards,
        ..player.clone()
    })
}
