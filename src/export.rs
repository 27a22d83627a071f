use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::model::{Branch, Player, ReportCard};
use crate::store::RemoteStore;
use crate::sync::{FetchMode, load_snapshot};
use crate::views::sorted_reports;

pub struct ExportReport {
    pub players: usize,
    pub reports: usize,
    pub stats: usize,
    pub targets: usize,
}

pub struct ExportProgress {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

/// Players as they are stored, optionally limited to one team. Built-in data is never
/// substituted, so an unreadable store is an error rather than a demo workbook.
pub fn load_export_players(store: &dyn RemoteStore, team: Option<&str>) -> Result<Vec<Player>> {
    store.check().context("store not configured")?;
    let snapshot = load_snapshot(store, FetchMode::Refetch, 0)?;
    for warning in &snapshot.warnings {
        eprintln!("[WARN] {warning}");
    }
    let players = snapshot
        .players
        .ok_or_else(|| anyhow!("players could not be read from the store"))?;
    Ok(players
        .into_iter()
        .filter(|p| team.is_none_or(|team| p.team_id.as_deref() == Some(team)))
        .collect())
}

/// Rows for the three report sheets, header first.
#[derive(Debug, Default)]
pub struct ReportRows {
    pub reports: Vec<Vec<String>>,
    pub stats: Vec<Vec<String>>,
    pub targets: Vec<Vec<String>>,
}

pub fn report_rows<'a>(
    players: impl IntoIterator<Item = &'a Player>,
    mut on_progress: impl FnMut(ExportProgress),
) -> ReportRows {
    let players: Vec<&Player> = players.into_iter().collect();
    let total = players.len();

    let mut rows = ReportRows {
        reports: vec![header(&[
            "Player ID",
            "Player",
            "Branch",
            "Team",
            "Report ID",
            "Season",
            "Term",
            "Date",
            "Author",
            "Overall",
            "Attendance",
            "Commitment",
            "Application",
            "Behaviour",
            "Strengths",
            "Key Area",
            "Build On",
            "Summary",
            "Footer",
        ])],
        stats: vec![header(&[
            "Player ID",
            "Player",
            "Report ID",
            "Season",
            "Term",
            "Group",
            "Skill",
            "Value",
            "Full Mark",
        ])],
        targets: vec![header(&[
            "Player ID",
            "Player",
            "Report ID",
            "Target",
            "Achieved",
        ])],
    };

    for (idx, player) in players.into_iter().enumerate() {
        for report in sorted_reports(player) {
            rows.reports.push(report_row(player, report));
            rows.stats.extend(stat_rows(player, report));
            rows.targets.extend(target_rows(player, report));
        }
        on_progress(ExportProgress {
            current: idx + 1,
            total,
            message: format!("Player: {} ({} reports)", player.name, player.report_cards.len()),
        });
    }
    rows
}

pub fn export_reports_with_progress(
    path: &Path,
    players: &[Player],
    on_progress: impl FnMut(ExportProgress),
) -> Result<ExportReport> {
    let rows = report_rows(players, on_progress);

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Reports")?;
        write_rows(sheet, &rows.reports)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Stats")?;
        write_rows(sheet, &rows.stats)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Targets")?;
        write_rows(sheet, &rows.targets)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportReport {
        players: players.len(),
        reports: rows.reports.len().saturating_sub(1),
        stats: rows.stats.len().saturating_sub(1),
        targets: rows.targets.len().saturating_sub(1),
    })
}

fn header(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

fn branch_label(branch: Branch) -> &'static str {
    match branch {
        Branch::Academy => "Academy",
        Branch::Coaching => "Coaching",
        Branch::TechCentre => "Tech Centre",
    }
}

fn report_row(player: &Player, report: &ReportCard) -> Vec<String> {
    vec![
        player.id.clone(),
        player.name.clone(),
        branch_label(player.branch).to_string(),
        player.team_id.clone().unwrap_or_default(),
        report.id.clone(),
        report.season.clone(),
        report.quarter.clone(),
        report.date.clone(),
        report.author_coach_name.clone().unwrap_or_default(),
        format!("{:.1}", report.overall_rating),
        report.attendance.attendance_score.to_string(),
        report.attendance.commitment_score.to_string(),
        report.ratings_summary.application_score.to_string(),
        report.ratings_summary.behaviour_score.to_string(),
        report.strengths.join("; "),
        report.improvements.key_area.clone(),
        report.improvements.build_on_area.clone(),
        report.final_summary.clone(),
        report.coach_footer_note.clone(),
    ]
}

fn stat_rows(player: &Player, report: &ReportCard) -> Vec<Vec<String>> {
    report
        .stats
        .iter()
        .map(|stat| {
            vec![
                player.id.clone(),
                player.name.clone(),
                report.id.clone(),
                report.season.clone(),
                report.quarter.clone(),
                stat.group.label().to_string(),
                stat.name.clone(),
                stat.value.to_string(),
                stat.full_mark.to_string(),
            ]
        })
        .collect()
}

fn target_rows(player: &Player, report: &ReportCard) -> Vec<Vec<String>> {
    report
        .targets
        .iter()
        .map(|target| {
            vec![
                player.id.clone(),
                player.name.clone(),
                report.id.clone(),
                target.description.clone(),
                if target.achieved {
                    "yes".to_string()
                } else {
                    "no".to_string()
                },
            ]
        })
        .collect()
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::fallback_players;
    use crate::sqlite_store::SqliteStore;
    use crate::store::Collection;

    #[test]
    fn rows_cover_every_report() {
        let players = fallback_players();
        let mut seen = 0;
        let rows = report_rows(&players, |p| seen = p.current);
        assert_eq!(seen, players.len());
        assert_eq!(rows.reports.len(), 2);
        assert_eq!(rows.stats.len(), 1 + 22);
        assert_eq!(rows.reports[1][1], "Luke Skehill");
        assert_eq!(rows.reports[1][9], "4.1");
    }

    #[test]
    fn export_players_never_use_built_in_data() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(load_export_players(&store, None).unwrap().is_empty());

        for player in fallback_players() {
            store
                .upsert(
                    Collection::Players,
                    &player.id,
                    &serde_json::to_value(&player).unwrap(),
                )
                .unwrap();
        }
        let reds = load_export_players(&store, Some("U10 Reds")).unwrap();
        assert!(!reds.is_empty());
        assert!(reds.iter().all(|p| p.team_id.as_deref() == Some("U10 Reds")));
    }
}
