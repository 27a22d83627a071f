use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

use crate::draft::Draft;
use crate::http_client::narrative_http_client;
use crate::model::{Improvements, Narrative, Player, ReportCard, STAT_GROUPS};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const ASK_COACH_FALLBACK: &str =
    "Sorry, I'm having trouble connecting to the coach AI right now.";

/// Text-generation backend used for report narratives and parent questions.
pub trait NarrativeGenerator: Send + Sync {
    /// Asks for a JSON document; returns the raw response text.
    fn generate_structured(&self, prompt: &str) -> Result<String>;

    fn generate_freeform(&self, prompt: &str) -> Result<String>;
}

pub struct GeminiClient {
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.trim().to_string(),
            model: model.trim().to_string(),
        }
    }

    fn generate(&self, prompt: &str, json_mode: bool) -> Result<String> {
        let client = narrative_http_client()?;
        let url = format!("{GEMINI_BASE_URL}/{}:generateContent", self.model);
        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        if json_mode {
            body["generationConfig"] = json!({ "responseMimeType": "application/json" });
        }
        let resp = client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .context("narrative request failed")?;
        let status = resp.status();
        let text = resp.text().context("failed reading narrative body")?;
        if !status.is_success() {
            return Err(anyhow!("narrative http {}: {}", status, text));
        }
        extract_candidate_text(&text)
    }
}

impl NarrativeGenerator for GeminiClient {
    fn generate_structured(&self, prompt: &str) -> Result<String> {
        self.generate(prompt, true)
    }

    fn generate_freeform(&self, prompt: &str) -> Result<String> {
        self.generate(prompt, false)
    }
}

pub fn extract_candidate_text(raw: &str) -> Result<String> {
    let root: Value = serde_json::from_str(raw).context("invalid generateContent json")?;
    let parts = root
        .get("candidates")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.get("parts"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("response has no candidates"))?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(anyhow!("response candidate is empty"));
    }
    Ok(text)
}

/// Skill values grouped by category, one line per group.
pub fn stats_summary(draft: &Draft) -> String {
    STAT_GROUPS
        .iter()
        .map(|group| {
            let items: Vec<String> = group
                .skills()
                .iter()
                .map(|name| format!("{name}: {}", draft.stat(name).unwrap_or(0)))
                .collect();
            format!("{}: {}", group.label(), items.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_feedback_prompt(player: &Player, draft: &Draft) -> String {
    format!(
        "You are an experienced youth football coach writing a player report card.\n\
         Player: {name} ({position}).\n\
         Skill ratings on a 1-5 scale:\n{stats}\n\
         Attendance {att}/5, commitment {com}/5. Application {app}/5, behaviour {beh}/5.\n\
         Coach notes:\n{notes}\n\n\
         Reply with JSON only, using this schema:\n\
         {{\"summary\": \"string, about 50 words\", \
         \"strengths\": [\"string\", \"string\", \"string\"], \
         \"improvements\": {{\"keyArea\": \"string\", \"buildOnArea\": \"string\"}}}}",
        name = player.name,
        position = player.position,
        stats = stats_summary(draft),
        att = draft.attendance.attendance_score,
        com = draft.attendance.commitment_score,
        app = draft.ratings.application_score,
        beh = draft.ratings.behaviour_score,
        notes = draft.coach_notes,
    )
}

/// Parses a structured narrative. Anything that is not the expected JSON shape is an error
/// the caller can surface and retry.
pub fn parse_narrative(raw: &str) -> Result<Narrative> {
    let trimmed = strip_code_fence(raw.trim());
    if trimmed.is_empty() {
        return Err(anyhow!("narrative response is empty"));
    }
    let root: Value = serde_json::from_str(trimmed).context("narrative is not valid json")?;
    let summary = root
        .get("summary")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("narrative has no summary"))?;
    let strengths = root
        .get("strengths")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    let improvements = match root.get("improvements") {
        Some(Value::Object(map)) => Improvements {
            key_area: str_at(map.get("keyArea")),
            build_on_area: str_at(map.get("buildOnArea")),
        },
        Some(Value::Array(items)) => Improvements {
            key_area: str_at(items.first()),
            build_on_area: str_at(items.get(1)),
        },
        _ => return Err(anyhow!("narrative has no improvements")),
    };
    Ok(Narrative {
        summary,
        strengths,
        improvements,
    })
}

fn str_at(value: Option<&Value>) -> String {
    value
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn strip_code_fence(raw: &str) -> &str {
    let Some(rest) = raw.strip_prefix("```") else {
        return raw;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Generates and parses a narrative for the player's current draft.
pub fn generate_narrative(
    generator: &dyn NarrativeGenerator,
    player: &Player,
    draft: &Draft,
) -> Result<Narrative> {
    let prompt = build_feedback_prompt(player, draft);
    let raw = generator.generate_structured(&prompt)?;
    parse_narrative(&raw)
}

pub fn build_question_prompt(question: &str, report: &ReportCard, player: &Player) -> String {
    let stats = serde_json::to_string(&report.stats).unwrap_or_default();
    format!(
        "Context: player {name}, position {position}. Season {season}, {quarter}.\n\
         Stats: {stats}.\n\
         Summary: {summary}.\n\
         Strengths: {strengths}.\n\
         Improvements: {key}; {build}.\n\n\
         Parent's question: \"{question}\"\n\n\
         You are the club's assistant. Answer from this report card, suggest specific drills \
         if asked, stay positive and keep it under 150 words.",
        name = player.name,
        position = player.position,
        season = report.season,
        quarter = report.quarter,
        summary = report.final_summary,
        strengths = report.strengths.join(", "),
        key = report.improvements.key_area,
        build = report.improvements.build_on_area,
    )
}

/// Answers a parent's question about a report. Failures collapse into a friendly message.
pub fn ask_coach(
    generator: &dyn NarrativeGenerator,
    question: &str,
    report: &ReportCard,
    player: &Player,
) -> String {
    let prompt = build_question_prompt(question, report, player);
    match generator.generate_freeform(&prompt) {
        Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
        _ => ASK_COACH_FALLBACK.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_fence() {
        assert_eq!(strip_code_fence("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("{}"), "{}");
    }

    #[test]
    fn extracts_text_from_candidates() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        assert_eq!(extract_candidate_text(raw).unwrap(), "{\"a\":1}");
        assert!(extract_candidate_text(r#"{"candidates":[]}"#).is_err());
    }
}
