use std::collections::BTreeMap;

use chrono::DateTime;

use crate::model::{Branch, Coach, Player, ReportCard, STAT_GROUPS, StatGroup, round1};

const NO_REPORT_RATING: f64 = 3.0;

/// Players a coach may see. Admins see everyone; other coaches see academy players on their
/// assigned teams.
pub fn visible_players<'a>(coach: &Coach, players: &'a [Player]) -> Vec<&'a Player> {
    if coach.is_admin {
        return players.iter().collect();
    }
    players
        .iter()
        .filter(|p| p.branch == Branch::Academy)
        .filter(|p| {
            p.team_id
                .as_ref()
                .is_some_and(|t| coach.assigned_teams.iter().any(|a| a == t))
        })
        .collect()
}

pub fn team_players<'a>(players: &'a [Player], team_id: &str) -> Vec<&'a Player> {
    players
        .iter()
        .filter(|p| p.team_id.as_deref() == Some(team_id))
        .collect()
}

/// Mean of each player's latest overall rating; players without a report count as 3.
pub fn team_rating(players: &[Player], team_id: &str) -> Option<f64> {
    let members = team_players(players, team_id);
    if members.is_empty() {
        return None;
    }
    let sum: f64 = members
        .iter()
        .map(|p| p.latest_report().map_or(NO_REPORT_RATING, |r| r.overall_rating))
        .sum();
    Some(round1(sum / members.len() as f64))
}

fn report_time(report: &ReportCard) -> i64 {
    DateTime::parse_from_rfc3339(&report.date)
        .map(|d| d.timestamp_millis())
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(&report.date, "%Y-%m-%d").map(|d| {
                d.and_hms_opt(0, 0, 0)
                    .map(|t| t.and_utc().timestamp_millis())
                    .unwrap_or(0)
            })
        })
        .unwrap_or(0)
}

/// Reports newest first by date.
pub fn sorted_reports(player: &Player) -> Vec<&ReportCard> {
    let mut reports: Vec<&ReportCard> = player.report_cards.iter().collect();
    reports.sort_by_key(|r| std::cmp::Reverse(report_time(r)));
    reports
}

pub fn reports_by_season(player: &Player) -> BTreeMap<String, Vec<&ReportCard>> {
    let mut out: BTreeMap<String, Vec<&ReportCard>> = BTreeMap::new();
    for report in sorted_reports(player) {
        out.entry(report.season.clone()).or_default().push(report);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub label: String,
    pub averages: [(StatGroup, f64); 4],
}

/// Per-category averages for each report, oldest first, for the parent trend chart.
pub fn category_trend(player: &Player) -> Vec<TrendPoint> {
    let mut reports = sorted_reports(player);
    reports.reverse();
    reports
        .into_iter()
        .map(|report| TrendPoint {
            label: report.quarter.clone(),
            averages: STAT_GROUPS.map(|g| (g, report.group_average(g).unwrap_or(0.0))),
        })
        .collect()
}

/// Team names from comma-separated ages and suffixes: the cross product, or either list alone.
pub fn bulk_team_names(ages: &str, suffixes: &str) -> Vec<String> {
    let split = |raw: &str| -> Vec<String> {
        raw.split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    };
    let ages = split(ages);
    let suffixes = split(suffixes);
    match (ages.is_empty(), suffixes.is_empty()) {
        (false, false) => ages
            .iter()
            .flat_map(|age| suffixes.iter().map(move |suffix| format!("{age} {suffix}")))
            .collect(),
        (false, true) => ages,
        (true, false) => suffixes,
        (true, true) => Vec::new(),
    }
}
