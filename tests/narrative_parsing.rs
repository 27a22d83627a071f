use std::fs;
use std::path::PathBuf;

use anyhow::Result;

use coach_portal::draft::Draft;
use coach_portal::fallback::fallback_players;
use coach_portal::narrative::{
    ASK_COACH_FALLBACK, NarrativeGenerator, ask_coach, build_feedback_prompt,
    extract_candidate_text, generate_narrative, parse_narrative,
};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

struct Scripted(Result<String, String>);

impl NarrativeGenerator for Scripted {
    fn generate_structured(&self, _prompt: &str) -> Result<String> {
        self.0.clone().map_err(anyhow::Error::msg)
    }

    fn generate_freeform(&self, _prompt: &str) -> Result<String> {
        self.0.clone().map_err(anyhow::Error::msg)
    }
}

#[test]
fn parses_fenced_gemini_response() {
    let raw = read_fixture("gemini_narrative.json");
    let text = extract_candidate_text(&raw).expect("fixture should have a candidate");
    let narrative = parse_narrative(&text).expect("narrative should parse");
    assert!(narrative.summary.starts_with("Mason has worked hard"));
    assert_eq!(narrative.strengths.len(), 3);
    assert_eq!(narrative.improvements.key_area, "Scanning before receiving");
    assert_eq!(narrative.improvements.build_on_area, "Weak-foot passing");
}

#[test]
fn accepts_list_shaped_improvements() {
    let raw = read_fixture("gemini_list_improvements.json");
    let text = extract_candidate_text(&raw).unwrap();
    let narrative = parse_narrative(&text).unwrap();
    assert_eq!(narrative.strengths, vec!["Pace"]);
    assert_eq!(narrative.improvements.key_area, "Defensive positioning");
    assert_eq!(narrative.improvements.build_on_area, "Finishing");
}

#[test]
fn blocked_response_is_an_error() {
    let raw = read_fixture("gemini_blocked.json");
    assert!(extract_candidate_text(&raw).is_err());
}

#[test]
fn malformed_narratives_are_errors() {
    assert!(parse_narrative("").is_err());
    assert!(parse_narrative("not json").is_err());
    assert!(parse_narrative(r#"{"strengths": ["a"], "improvements": {}}"#).is_err());
    assert!(parse_narrative(r#"{"summary": "ok", "strengths": []}"#).is_err());
}

#[test]
fn prompt_carries_ratings_and_notes() {
    let players = fallback_players();
    let mut draft = Draft::seeded(None);
    draft.set_stat("Ball Mastery", 5).unwrap();
    draft.coach_notes = "Loves to dribble".to_string();
    let prompt = build_feedback_prompt(&players[0], &draft);
    assert!(prompt.contains("Luke Skehill"));
    assert!(prompt.contains("Ball Mastery: 5"));
    assert!(prompt.contains("Loves to dribble"));
}

#[test]
fn generate_narrative_parses_generator_output() {
    let players = fallback_players();
    let draft = Draft::seeded(None);
    let ok = Scripted(Ok(
        r#"{"summary":"ok","strengths":["a"],"improvements":{"keyArea":"x","buildOnArea":"y"}}"#
            .to_string(),
    ));
    assert_eq!(generate_narrative(&ok, &players[1], &draft).unwrap().summary, "ok");

    let down = Scripted(Err("503".to_string()));
    assert!(generate_narrative(&down, &players[1], &draft).is_err());
}

#[test]
fn ask_coach_falls_back_on_failure() {
    let players = fallback_players();
    let report = &players[0].report_cards[0];
    let answer = ask_coach(&Scripted(Ok(" Try rondos. ".to_string())), "Drills?", report, &players[0]);
    assert_eq!(answer, "Try rondos.");
    let answer = ask_coach(&Scripted(Err("quota".to_string())), "Drills?", report, &players[0]);
    assert_eq!(answer, ASK_COACH_FALLBACK);
}
