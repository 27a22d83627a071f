use crate::model::{
    AttendanceRecord, Branch, Coach, Improvements, Player, RatingsSummary, ReportCard,
    SCHEMA_VERSION, Stat, StatGroup, Target, Team, UserRole, FULL_MARK, stat_template,
};

// Built-in data used when a remote collection comes back empty.

pub const DEFAULT_LOGO_URL: &str = "https://cdn-icons-png.flaticon.com/512/1665/1665670.png";

pub fn fallback_teams() -> Vec<Team> {
    ["U10 Reds", "U10 Blues"]
        .into_iter()
        .map(|name| Team {
            id: name.to_string(),
            name: name.to_string(),
        })
        .collect()
}

pub fn fallback_coaches() -> Vec<Coach> {
    vec![Coach {
        id: "coach_admin".to_string(),
        name: "Head Coach".to_string(),
        role: UserRole::Coach,
        email: "admin@example.com".to_string(),
        instagram_handle: Some("academy_official".to_string()),
        password: Some("admin".to_string()),
        assigned_teams: Vec::new(),
        is_admin: true,
        image_url: Some(avatar_url("Coach")),
    }]
}

pub fn fallback_players() -> Vec<Player> {
    vec![
        Player {
            id: "p1".to_string(),
            name: "Luke Skehill".to_string(),
            branch: Branch::Academy,
            team_id: Some("U10 Reds".to_string()),
            position: "Midfield".to_string(),
            jersey_number: Some(7),
            image_url: avatar_url("Luke"),
            access_code: "1234".to_string(),
            report_cards: vec![sample_report()],
            schema_version: SCHEMA_VERSION,
        },
        Player {
            id: "p2".to_string(),
            name: "Mason Mount-Jr".to_string(),
            branch: Branch::Academy,
            team_id: Some("U10 Blues".to_string()),
            position: "Forward".to_string(),
            jersey_number: Some(10),
            image_url: avatar_url("Mason"),
            access_code: "7777".to_string(),
            report_cards: Vec::new(),
            schema_version: SCHEMA_VERSION,
        },
        Player {
            id: "p3".to_string(),
            name: "Sarah Coachable".to_string(),
            branch: Branch::Coaching,
            team_id: None,
            position: "Goalkeeper".to_string(),
            jersey_number: None,
            image_url: avatar_url("Sarah"),
            access_code: "1111".to_string(),
            report_cards: Vec::new(),
            schema_version: SCHEMA_VERSION,
        },
    ]
}

pub fn avatar_url(seed: &str) -> String {
    format!("https://api.dicebear.com/7.x/avataaars/svg?seed={}", seed.replace(' ', "%20"))
}

/// Builds template-ordered stats from per-group value lists.
pub fn stats_from_groups(groups: [&[u8]; 4]) -> Vec<Stat> {
    let mut cursor = [0usize; 4];
    stat_template()
        .map(|(group, name)| {
            let idx = group_index(group);
            let value = groups[idx].get(cursor[idx]).copied().unwrap_or(3);
            cursor[idx] += 1;
            Stat {
                name: name.to_string(),
                group,
                value,
                full_mark: FULL_MARK,
            }
        })
        .collect()
}

fn group_index(group: StatGroup) -> usize {
    match group {
        StatGroup::Technical => 0,
        StatGroup::Tactical => 1,
        StatGroup::Physical => 2,
        StatGroup::Psychological => 3,
    }
}

fn sample_report() -> ReportCard {
    ReportCard {
        id: "rc_2526_q2".to_string(),
        season: "2025/26".to_string(),
        quarter: "Winter Term".to_string(),
        date: "2025-12-12T00:00:00+00:00".to_string(),
        author_coach_id: Some("coach_admin".to_string()),
        author_coach_name: Some("Head Coach".to_string()),
        attendance: AttendanceRecord {
            attendance_score: 5,
            commitment_score: 4,
            note: "Excellent attendance record.".to_string(),
        },
        stats: stats_from_groups([
            &[4, 4, 3, 5, 4, 4, 3],
            &[4, 4, 4, 3, 4],
            &[5, 4, 3, 5],
            &[5, 5, 5, 4, 4, 5],
        ]),
        strengths: vec![
            "Work Rate".to_string(),
            "Passing Range".to_string(),
            "Speed".to_string(),
        ],
        improvements: Improvements {
            key_area: "Scanning before receiving the ball.".to_string(),
            build_on_area: "Using left foot for crossing.".to_string(),
        },
        ratings_summary: RatingsSummary {
            application_score: 5,
            behaviour_score: 5,
            coach_comment: "A model student.".to_string(),
        },
        final_summary: "Luke has had a fantastic term. His energy on the pitch is infectious and \
                        he is becoming a real leader. He needs to keep checking his shoulder \
                        before receiving."
            .to_string(),
        coach_footer_note: "Keep up the great work over the holidays, Luke!".to_string(),
        targets: vec![
            Target {
                id: "tg1".to_string(),
                description: "Score 5 goals with left foot".to_string(),
                achieved: false,
            },
            Target {
                id: "tg2".to_string(),
                description: "Lead the warm up".to_string(),
                achieved: true,
            },
        ],
        overall_rating: 4.1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::mean_rounded;

    #[test]
    fn sample_report_rating_matches_stats() {
        let players = fallback_players();
        let card = &players[0].report_cards[0];
        let values: Vec<u8> = card.stats.iter().map(|s| s.value).collect();
        assert_eq!(values.len(), 22);
        assert_eq!(mean_rounded(&values), Some(card.overall_rating));
    }

    #[test]
    fn coaching_fallback_player_has_no_team() {
        let players = fallback_players();
        let sarah = players.iter().find(|p| p.branch == Branch::Coaching).unwrap();
        assert!(sarah.team_id.is_none());
        assert!(sarah.jersey_number.is_none());
    }
}
