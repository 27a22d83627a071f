use std::collections::{BTreeMap, HashMap};

use anyhow::{Result, anyhow, bail};

use crate::model::{
    AttendanceRecord, DEFAULT_QUARTER, DEFAULT_SEASON, FULL_MARK, Narrative, RatingsSummary,
    Target, new_id, stat_template,
};

pub const MAX_STRENGTHS: usize = 3;
const DEFAULT_SKILL: u8 = 3;
const DEFAULT_SCORE: u8 = 4;

/// Unpublished report-card fields for one player.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub stat_values: BTreeMap<String, u8>,
    pub attendance: AttendanceRecord,
    pub ratings: RatingsSummary,
    pub coach_notes: String,
    pub season: String,
    pub quarter: String,
    pub narrative: Option<Narrative>,
    pub targets: Vec<Target>,
    pub coach_footer_note: String,
    pub manual_strengths: Vec<String>,
    pub author_coach_id: Option<String>,
}

impl Draft {
    pub fn seeded(author_coach_id: Option<&str>) -> Self {
        Self {
            stat_values: stat_template()
                .map(|(_, name)| (name.to_string(), DEFAULT_SKILL))
                .collect(),
            attendance: AttendanceRecord {
                attendance_score: DEFAULT_SCORE,
                commitment_score: DEFAULT_SCORE,
                note: String::new(),
            },
            ratings: RatingsSummary {
                application_score: DEFAULT_SCORE,
                behaviour_score: DEFAULT_SCORE,
                coach_comment: String::new(),
            },
            coach_notes: String::new(),
            season: DEFAULT_SEASON.to_string(),
            quarter: DEFAULT_QUARTER.to_string(),
            narrative: None,
            targets: Vec::new(),
            coach_footer_note: String::new(),
            manual_strengths: Vec::new(),
            author_coach_id: author_coach_id.map(|id| id.to_string()),
        }
    }

    pub fn stat(&self, name: &str) -> Option<u8> {
        self.stat_values.get(name).copied()
    }

    pub fn set_stat(&mut self, name: &str, value: u8) -> Result<()> {
        let Some(slot) = self.stat_values.get_mut(name) else {
            bail!("unknown skill: {name}");
        };
        *slot = clamp_score(value);
        Ok(())
    }

    pub fn set_attendance(&mut self, attendance: u8, commitment: u8) {
        self.attendance.attendance_score = clamp_score(attendance);
        self.attendance.commitment_score = clamp_score(commitment);
    }

    pub fn set_ratings(&mut self, application: u8, behaviour: u8) {
        self.ratings.application_score = clamp_score(application);
        self.ratings.behaviour_score = clamp_score(behaviour);
    }

    pub fn add_target(&mut self, description: &str) -> Option<String> {
        let description = description.trim();
        if description.is_empty() {
            return None;
        }
        let id = new_id("tg");
        self.targets.push(Target {
            id: id.clone(),
            description: description.to_string(),
            achieved: false,
        });
        Some(id)
    }

    pub fn remove_target(&mut self, id: &str) {
        self.targets.retain(|t| t.id != id);
    }

    pub fn toggle_target(&mut self, id: &str) {
        if let Some(target) = self.targets.iter_mut().find(|t| t.id == id) {
            target.achieved = !target.achieved;
        }
    }

    pub fn add_strength(&mut self, strength: &str) -> bool {
        let strength = strength.trim();
        if strength.is_empty() || self.manual_strengths.len() >= MAX_STRENGTHS {
            return false;
        }
        self.manual_strengths.push(strength.to_string());
        true
    }

    pub fn remove_strength(&mut self, index: usize) {
        if index < self.manual_strengths.len() {
            self.manual_strengths.remove(index);
        }
    }

    /// Stores a freshly generated narrative. Empty manual strengths are filled from it.
    pub fn accept_narrative(&mut self, narrative: Narrative) {
        if self.manual_strengths.is_empty() {
            self.manual_strengths = narrative
                .strengths
                .iter()
                .take(MAX_STRENGTHS)
                .cloned()
                .collect();
        }
        self.narrative = Some(narrative);
    }
}

fn clamp_score(value: u8) -> u8 {
    value.clamp(1, FULL_MARK)
}

/// Per-player drafts plus the player currently being edited.
///
/// There is one copy of each draft; the active editor works on the map entry itself, so every
/// edit lands on the player that was selected when it was made.
#[derive(Debug, Clone, Default)]
pub struct DraftBuffer {
    drafts: HashMap<String, Draft>,
    active: Option<String>,
}

impl DraftBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `player_id` the active draft, seeding a default one on first selection.
    pub fn select_player(&mut self, player_id: &str, current_coach_id: Option<&str>) -> &Draft {
        self.active = Some(player_id.to_string());
        self.drafts
            .entry(player_id.to_string())
            .or_insert_with(|| Draft::seeded(current_coach_id))
    }

    pub fn clear_selection(&mut self) {
        self.active = None;
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active(&self) -> Option<&Draft> {
        self.active.as_ref().and_then(|id| self.drafts.get(id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Draft> {
        let id = self.active.as_ref()?;
        self.drafts.get_mut(id)
    }

    /// Applies one edit to the active draft.
    pub fn edit<T>(&mut self, f: impl FnOnce(&mut Draft) -> T) -> Result<T> {
        let draft = self
            .active_mut()
            .ok_or_else(|| anyhow!("no player selected"))?;
        Ok(f(draft))
    }

    pub fn set_stat(&mut self, name: &str, value: u8) -> Result<()> {
        self.edit(|draft| draft.set_stat(name, value))?
    }

    pub fn get(&self, player_id: &str) -> Option<&Draft> {
        self.drafts.get(player_id)
    }

    pub fn get_mut(&mut self, player_id: &str) -> Option<&mut Draft> {
        self.drafts.get_mut(player_id)
    }

    pub fn has_draft(&self, player_id: &str) -> bool {
        self.drafts.contains_key(player_id)
    }

    /// Narratives arrive asynchronously and belong to the player they were requested for,
    /// not whichever player is active when they land.
    pub fn store_narrative(&mut self, player_id: &str, narrative: Narrative) -> bool {
        match self.drafts.get_mut(player_id) {
            Some(draft) => {
                draft.accept_narrative(narrative);
                true
            }
            None => false,
        }
    }

    /// Drops a draft after its report card has been published.
    pub fn discard_draft(&mut self, player_id: &str) -> Option<Draft> {
        self.drafts.remove(player_id)
    }

    /// Forgets drafts for players that no longer exist.
    pub fn retain_players<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        let keep: std::collections::HashSet<&str> = ids.into_iter().collect();
        self.drafts.retain(|id, _| keep.contains(id.as_str()));
        if let Some(active) = &self.active
            && !keep.contains(active.as_str())
        {
            self.active = None;
        }
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_draft_uses_mid_scale_defaults() {
        let draft = Draft::seeded(Some("c1"));
        assert_eq!(draft.stat_values.len(), 22);
        assert!(draft.stat_values.values().all(|v| *v == 3));
        assert_eq!(draft.attendance.attendance_score, 4);
        assert_eq!(draft.ratings.behaviour_score, 4);
        assert_eq!(draft.author_coach_id.as_deref(), Some("c1"));
        assert!(draft.narrative.is_none());
    }

    #[test]
    fn scores_are_clamped_to_scale() {
        let mut draft = Draft::seeded(None);
        draft.set_stat("Focus", 9).unwrap();
        assert_eq!(draft.stat("Focus"), Some(5));
        draft.set_attendance(0, 3);
        assert_eq!(draft.attendance.attendance_score, 1);
        assert!(draft.set_stat("Juggling", 4).is_err());
    }

    #[test]
    fn strengths_cap_at_three() {
        let mut draft = Draft::seeded(None);
        assert!(draft.add_strength("a"));
        assert!(draft.add_strength("b"));
        assert!(draft.add_strength("c"));
        assert!(!draft.add_strength("d"));
        assert!(!Draft::seeded(None).add_strength("   "));
    }

    #[test]
    fn edit_without_selection_fails() {
        let mut buffer = DraftBuffer::new();
        assert!(buffer.set_stat("Focus", 5).is_err());
    }
}
