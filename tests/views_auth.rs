use coach_portal::auth::{LoginError, login_coach, login_parent};
use coach_portal::fallback::{fallback_coaches, fallback_players};
use coach_portal::model::{Coach, ReportCard, StatGroup};
use coach_portal::views::{
    category_trend, reports_by_season, sorted_reports, team_rating, visible_players,
};

fn team_coach(teams: &[&str]) -> Coach {
    Coach {
        is_admin: false,
        assigned_teams: teams.iter().map(|t| t.to_string()).collect(),
        ..fallback_coaches().remove(0)
    }
}

fn report(id: &str, season: &str, date: &str, value: u8) -> ReportCard {
    let mut card = fallback_players()[0].report_cards[0].clone();
    card.id = id.to_string();
    card.season = season.to_string();
    card.quarter = format!("Term {id}");
    card.date = date.to_string();
    for stat in &mut card.stats {
        stat.value = value;
    }
    card
}

#[test]
fn admin_sees_everyone_others_see_their_academy_teams() {
    let players = fallback_players();
    let admin = &fallback_coaches()[0];
    assert_eq!(visible_players(admin, &players).len(), 3);

    let reds = team_coach(&["U10 Reds"]);
    let ids: Vec<&str> = visible_players(&reds, &players)
        .iter()
        .map(|p| p.id.as_str())
        .collect();
    assert_eq!(ids, vec!["p1"]);

    assert!(visible_players(&team_coach(&[]), &players).is_empty());
}

#[test]
fn team_rating_counts_unrated_players_as_three() {
    let mut players = fallback_players();
    assert_eq!(team_rating(&players, "U10 Reds"), Some(4.1));
    assert_eq!(team_rating(&players, "U10 Blues"), Some(3.0));
    players[1].team_id = Some("U10 Reds".to_string());
    players[0].report_cards[0].overall_rating = 5.0;
    assert_eq!(team_rating(&players, "U10 Reds"), Some(4.0));
    assert_eq!(team_rating(&players, "Nobody"), None);
}

#[test]
fn reports_sort_newest_first_and_group_by_season() {
    let mut player = fallback_players().remove(1);
    player.report_cards = vec![
        report("a", "2024/25", "2024-12-01", 2),
        report("b", "2025/26", "2025-12-01T10:00:00+00:00", 4),
        report("c", "2024/25", "2025-04-01", 3),
    ];
    let ids: Vec<&str> = sorted_reports(&player).iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "c", "a"]);

    let seasons = reports_by_season(&player);
    assert_eq!(seasons["2024/25"].len(), 2);
    assert_eq!(seasons["2024/25"][0].id, "c");
    assert_eq!(seasons["2025/26"].len(), 1);

    let trend = category_trend(&player);
    let labels: Vec<&str> = trend.iter().map(|t| t.label.as_str()).collect();
    assert_eq!(labels, vec!["Term a", "Term c", "Term b"]);
    assert_eq!(trend[0].averages[0], (StatGroup::Technical, 2.0));
    assert_eq!(trend[2].averages[3], (StatGroup::Psychological, 4.0));
}

#[test]
fn achieved_targets_are_counted() {
    let players = fallback_players();
    assert_eq!(players[0].report_cards[0].targets_achieved(), 1);
}

#[test]
fn coach_login_rules() {
    let coaches = fallback_coaches();
    assert_eq!(login_coach(&coaches, " coach_admin ", "admin").unwrap().id, "coach_admin");
    assert_eq!(login_coach(&coaches, "coach_admin", "Admin"), Err(LoginError::BadPassword));
    assert_eq!(login_coach(&coaches, "", "admin"), Err(LoginError::UnknownCoach));
}

#[test]
fn parent_login_needs_matching_code() {
    let players = fallback_players();
    assert_eq!(login_parent(&players, "Mason Mount-Jr", "7777").unwrap().id, "p2");
    assert_eq!(
        login_parent(&players, "Mason Mount-Jr", "1234"),
        Err(LoginError::UnknownPlayer)
    );
}
