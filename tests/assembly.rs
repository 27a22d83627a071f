use chrono::{TimeZone, Utc};

use coach_portal::assemble::{AssembleError, PublishContext, assemble};
use coach_portal::draft::Draft;
use coach_portal::fallback::{fallback_coaches, fallback_players, stats_from_groups};
use coach_portal::model::{Coach, Improvements, Narrative, UserRole, stat_template};

fn narrative() -> Narrative {
    Narrative {
        summary: "ok".to_string(),
        strengths: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        improvements: Improvements {
            key_area: "x".to_string(),
            build_on_area: "y".to_string(),
        },
    }
}

fn assistant() -> Coach {
    Coach {
        id: "coach_2".to_string(),
        name: "Assistant".to_string(),
        role: UserRole::Coach,
        email: "assist@example.com".to_string(),
        instagram_handle: None,
        password: Some("pw".to_string()),
        assigned_teams: vec!["U10 Reds".to_string()],
        is_admin: false,
        image_url: None,
    }
}

fn draft_with_all(value: u8) -> Draft {
    let mut draft = Draft::seeded(None);
    for (_, name) in stat_template() {
        draft.set_stat(name, value).unwrap();
    }
    draft
}

#[test]
fn rating_is_rounded_mean_of_template_stats() {
    let players = fallback_players();
    let expected = &players[0].report_cards[0];
    let mut draft = Draft::seeded(None);
    for stat in stats_from_groups([
        &[4, 4, 3, 5, 4, 4, 3],
        &[4, 4, 4, 3, 4],
        &[5, 4, 3, 5],
        &[5, 5, 5, 4, 4, 5],
    ]) {
        draft.set_stat(&stat.name, stat.value).unwrap();
    }
    let coaches = fallback_coaches();
    let ctx = PublishContext {
        current_coach: &coaches[0],
        coaches: &coaches,
        now: Utc::now(),
        report_id: "rc-test".to_string(),
    };
    let updated = assemble(&draft, &players[1], Some(&narrative()), &ctx).unwrap();
    let card = &updated.report_cards[0];
    assert_eq!(card.stats.len(), 22);
    assert_eq!(card.overall_rating, expected.overall_rating);
    assert_eq!(card.overall_rating, 4.1);
}

#[test]
fn card_is_prepended_and_original_untouched() {
    let players = fallback_players();
    let luke = &players[0];
    let coaches = fallback_coaches();
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
    let ctx = PublishContext {
        current_coach: &coaches[0],
        coaches: &coaches,
        now,
        report_id: "rc-new".to_string(),
    };
    let updated = assemble(&draft_with_all(4), luke, Some(&narrative()), &ctx).unwrap();

    assert_eq!(luke.report_cards.len(), 1);
    assert_eq!(updated.report_cards.len(), 2);
    assert_eq!(updated.report_cards[0].id, "rc-new");
    assert_eq!(updated.report_cards[0].date, now.to_rfc3339());
    assert_eq!(updated.report_cards[1], luke.report_cards[0]);
    assert_eq!(updated.name, luke.name);
}

#[test]
fn manual_strengths_win_over_narrative() {
    let players = fallback_players();
    let coaches = fallback_coaches();
    let ctx = PublishContext {
        current_coach: &coaches[0],
        coaches: &coaches,
        now: Utc::now(),
        report_id: "rc".to_string(),
    };
    let mut draft = draft_with_all(4);
    draft.add_strength("Heading");
    let updated = assemble(&draft, &players[1], Some(&narrative()), &ctx).unwrap();
    assert_eq!(updated.report_cards[0].strengths, vec!["Heading"]);

    let updated = assemble(&draft_with_all(4), &players[1], Some(&narrative()), &ctx).unwrap();
    assert_eq!(updated.report_cards[0].strengths, vec!["a", "b", "c"]);
}

#[test]
fn generated_strengths_are_capped_at_three() {
    let players = fallback_players();
    let coaches = fallback_coaches();
    let ctx = PublishContext {
        current_coach: &coaches[0],
        coaches: &coaches,
        now: Utc::now(),
        report_id: "rc".to_string(),
    };
    let mut wordy = narrative();
    wordy.strengths.push("d".to_string());
    wordy.strengths.push("e".to_string());
    let updated = assemble(&draft_with_all(4), &players[1], Some(&wordy), &ctx).unwrap();
    assert_eq!(updated.report_cards[0].strengths, vec!["a", "b", "c"]);
}

#[test]
fn missing_narrative_is_rejected() {
    let players = fallback_players();
    let coaches = fallback_coaches();
    let ctx = PublishContext {
        current_coach: &coaches[0],
        coaches: &coaches,
        now: Utc::now(),
        report_id: "rc".to_string(),
    };
    let err = assemble(&draft_with_all(4), &players[1], None, &ctx).unwrap_err();
    assert_eq!(err, AssembleError::MissingNarrative);
}

#[test]
fn author_falls_back_to_current_coach() {
    let players = fallback_players();
    let mut coaches = fallback_coaches();
    coaches.push(assistant());
    let ctx = PublishContext {
        current_coach: &coaches[0],
        coaches: &coaches,
        now: Utc::now(),
        report_id: "rc".to_string(),
    };

    let mut draft = draft_with_all(3);
    draft.author_coach_id = Some("coach_2".to_string());
    let card = assemble(&draft, &players[1], Some(&narrative()), &ctx)
        .unwrap()
        .report_cards
        .remove(0);
    assert_eq!(card.author_coach_id.as_deref(), Some("coach_2"));
    assert_eq!(card.author_coach_name.as_deref(), Some("Assistant"));

    draft.author_coach_id = Some("departed".to_string());
    let card = assemble(&draft, &players[1], Some(&narrative()), &ctx)
        .unwrap()
        .report_cards
        .remove(0);
    assert_eq!(card.author_coach_id.as_deref(), Some("coach_admin"));
}
