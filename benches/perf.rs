use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::Value;
use std::hint::black_box;

use chrono::Utc;
use coach_portal::assemble::{PublishContext, assemble};
use coach_portal::draft::Draft;
use coach_portal::fallback::{fallback_coaches, fallback_players};
use coach_portal::model::{Improvements, Narrative};
use coach_portal::sanitize::sanitize_all;
use coach_portal::state::{Delta, PortalState, Snapshot, apply_delta};

fn legacy_rows(copies: usize) -> Vec<Value> {
    let base: Vec<Value> = serde_json::from_str(LEGACY_PLAYERS_JSON).expect("valid fixture json");
    (0..copies)
        .flat_map(|i| {
            base.iter().cloned().map(move |mut row| {
                if let Some(id) = row.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()) {
                    row["id"] = Value::String(format!("{id}-{i}"));
                }
                row
            })
        })
        .collect()
}

fn bench_sanitize_roster(c: &mut Criterion) {
    let rows = legacy_rows(100);
    c.bench_function("sanitize_roster", |b| {
        b.iter(|| {
            let (players, errors) = sanitize_all(black_box(rows.clone()));
            black_box((players.len(), errors.len()));
        })
    });
}

fn bench_assemble_report(c: &mut Criterion) {
    let players = fallback_players();
    let coaches = fallback_coaches();
    let draft = Draft::seeded(Some("coach_admin"));
    let narrative = Narrative {
        summary: "A steady term.".to_string(),
        strengths: vec!["Pace".to_string()],
        improvements: Improvements::default(),
    };
    let ctx = PublishContext {
        current_coach: &coaches[0],
        coaches: &coaches,
        now: Utc::now(),
        report_id: "rc-bench".to_string(),
    };
    c.bench_function("assemble_report", |b| {
        b.iter(|| {
            let player = assemble(black_box(&draft), &players[0], Some(&narrative), &ctx).unwrap();
            black_box(player.report_cards.len());
        })
    });
}

fn bench_refetch_apply(c: &mut Criterion) {
    let (players, _) = sanitize_all(legacy_rows(200));
    let snapshot = Snapshot {
        players: Some(players),
        coaches: Some(fallback_coaches()),
        teams: Some(Vec::new()),
        logo: None,
        write_seq: 0,
        warnings: Vec::new(),
    };
    c.bench_function("refetch_apply", |b| {
        b.iter(|| {
            let mut state = PortalState::new();
            apply_delta(&mut state, Delta::Refetched(black_box(snapshot.clone())));
            black_box(state.players.len());
        })
    });
}

criterion_group!(
    perf,
    bench_sanitize_roster,
    bench_assemble_report,
    bench_refetch_apply
);
criterion_main!(perf);

static LEGACY_PLAYERS_JSON: &str = include_str!("../tests/fixtures/legacy_players.json");
