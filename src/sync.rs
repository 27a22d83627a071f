use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::assemble::{PublishContext, assemble};
use crate::auth::{self, LoginError};
use crate::fallback::{
    DEFAULT_LOGO_URL, avatar_url, fallback_coaches, fallback_players, fallback_teams,
};
use crate::media::image_data_url;
use crate::model::{
    Branch, Coach, Player, SCHEMA_VERSION, Team, UNASSIGNED_TEAM_ID, UserRole, new_id,
};
use crate::narrative::{ASK_COACH_FALLBACK, NarrativeGenerator, ask_coach, generate_narrative};
use crate::sanitize::sanitize_all;
use crate::state::{
    Delta, Entity, LoadStatus, PortalState, Session, Snapshot, SyncCommand, WriteOutcome,
    apply_delta,
};
use crate::store::{
    ChangeNotice, Collection, LOGO_SETTING_KEY, RemoteStore, Subscription, WATCHED_COLLECTIONS,
    subscribe,
};
use crate::views::sorted_reports;

const DEFAULT_COACH_PASSWORD: &str = "password123";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The store cannot be reached or is not set up. No fallback data is used.
    NotConfigured(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::NotConfigured(reason) => write!(f, "store not configured: {reason}"),
        }
    }
}

impl std::error::Error for LoadError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Empty or unreadable collections are replaced by built-in data.
    Initial,
    /// Unreadable collections are left as they are locally; empty ones stay empty.
    Refetch,
}

/// Rows of one collection after parsing. `stored` counts the rows the store returned,
/// including the ones that were skipped.
struct Fetched<T> {
    items: Vec<T>,
    stored: usize,
    skipped: Vec<String>,
}

fn parse_rows<T: DeserializeOwned>(collection: Collection, rows: Vec<Value>) -> Fetched<T> {
    let stored = rows.len();
    let mut items = Vec::with_capacity(stored);
    let mut skipped = Vec::new();
    for row in rows {
        let id = row
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string();
        match serde_json::from_value(row) {
            Ok(item) => items.push(item),
            Err(err) => skipped.push(format!("{} {id}: {err}", collection.table())),
        }
    }
    Fetched {
        items,
        stored,
        skipped,
    }
}

fn fetch_entities<T: DeserializeOwned>(
    store: &dyn RemoteStore,
    collection: Collection,
) -> Result<Fetched<T>> {
    let rows = store.fetch(collection)?;
    Ok(parse_rows(collection, rows))
}

fn fetch_players(store: &dyn RemoteStore) -> Result<Fetched<Player>> {
    let rows = store.fetch(Collection::Players)?;
    let stored = rows.len();
    let (items, errors) = sanitize_all(rows);
    Ok(Fetched {
        items,
        stored,
        skipped: errors,
    })
}

// Built-in data only stands in for a collection that holds no rows at all. A collection whose
// rows all failed to parse stays empty.
fn resolve<T>(
    mode: FetchMode,
    collection: Collection,
    fetched: Result<Fetched<T>>,
    fallback: fn() -> Vec<T>,
    warnings: &mut Vec<String>,
) -> Option<Vec<T>> {
    match (mode, fetched) {
        (FetchMode::Initial, Ok(fetched)) if fetched.stored == 0 => {
            warnings.push(format!("{} is empty, using built-in data", collection.table()));
            Some(fallback())
        }
        (_, Ok(fetched)) => {
            warnings.extend(fetched.skipped.into_iter().map(|e| format!("skipped {e}")));
            Some(fetched.items)
        }
        (FetchMode::Initial, Err(err)) => {
            warnings.push(format!(
                "{} fetch failed ({err:#}), using built-in data",
                collection.table()
            ));
            Some(fallback())
        }
        (FetchMode::Refetch, Err(err)) => {
            warnings.push(format!("{} refetch failed: {err:#}", collection.table()));
            None
        }
    }
}

/// Fetches players, coaches, teams and the logo in parallel and sanitizes players.
pub fn load_snapshot(
    store: &dyn RemoteStore,
    mode: FetchMode,
    write_seq: u64,
) -> Result<Snapshot, LoadError> {
    if mode == FetchMode::Initial {
        store
            .check()
            .map_err(|err| LoadError::NotConfigured(format!("{err:#}")))?;
    }

    let ((players, coaches), (teams, logo)) = rayon::join(
        || {
            rayon::join(
                || fetch_players(store),
                || fetch_entities::<Coach>(store, Collection::Coaches),
            )
        },
        || {
            rayon::join(
                || fetch_entities::<Team>(store, Collection::Teams),
                || store.fetch_setting(LOGO_SETTING_KEY),
            )
        },
    );

    let mut warnings = Vec::new();
    let players = resolve(mode, Collection::Players, players, fallback_players, &mut warnings);
    let coaches = resolve(mode, Collection::Coaches, coaches, fallback_coaches, &mut warnings);
    let teams = resolve(mode, Collection::Teams, teams, fallback_teams, &mut warnings);
    let logo = match (mode, logo) {
        (_, Ok(Some(value))) if !value.trim().is_empty() => Some(value),
        (FetchMode::Initial, Ok(_)) => Some(DEFAULT_LOGO_URL.to_string()),
        (FetchMode::Initial, Err(err)) => {
            warnings.push(format!("logo fetch failed ({err:#}), using default"));
            Some(DEFAULT_LOGO_URL.to_string())
        }
        (FetchMode::Refetch, Ok(_)) => None,
        (FetchMode::Refetch, Err(err)) => {
            warnings.push(format!("logo refetch failed: {err:#}"));
            None
        }
    };

    Ok(Snapshot {
        players,
        coaches,
        teams,
        logo,
        write_seq,
        warnings,
    })
}

/// Owns the store side of synchronisation: executes commands and reacts to remote changes.
#[derive(Clone)]
pub struct SyncWorker {
    store: Arc<dyn RemoteStore>,
    generator: Option<Arc<dyn NarrativeGenerator>>,
    write_seq: Arc<AtomicU64>,
}

impl SyncWorker {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        generator: Option<Arc<dyn NarrativeGenerator>>,
    ) -> Self {
        Self {
            store,
            generator,
            write_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_seq(&self) -> u64 {
        self.write_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current_seq(&self) -> u64 {
        self.write_seq.load(Ordering::SeqCst)
    }

    fn write_outcome(&self, collection: Collection, id: String, result: Result<()>) -> Delta {
        let seq = self.next_seq();
        Delta::Write(match result {
            Ok(()) => WriteOutcome::Persisted {
                collection,
                id,
                seq,
            },
            Err(err) => WriteOutcome::Failed {
                collection,
                id,
                seq,
                error: format!("{err:#}"),
            },
        })
    }

    /// Refetches all four collections from scratch.
    pub fn on_remote_change(&self, notice: &ChangeNotice) -> Delta {
        let seq = self.current_seq();
        match load_snapshot(self.store.as_ref(), FetchMode::Refetch, seq) {
            Ok(snapshot) => Delta::Refetched(snapshot),
            Err(err) => Delta::Log(format!(
                "[WARN] Refetch after change in {} collections failed: {err}",
                notice.collections.len()
            )),
        }
    }

    pub fn execute(&self, cmd: SyncCommand) -> Vec<Delta> {
        match cmd {
            SyncCommand::InitialLoad => {
                let seq = self.current_seq();
                match load_snapshot(self.store.as_ref(), FetchMode::Initial, seq) {
                    Ok(snapshot) => vec![Delta::Loaded(snapshot)],
                    Err(LoadError::NotConfigured(reason)) => vec![Delta::LoadFailed(reason)],
                }
            }
            SyncCommand::Refetch => vec![self.on_remote_change(&ChangeNotice {
                collections: WATCHED_COLLECTIONS.to_vec(),
            })],
            SyncCommand::Upsert {
                collection,
                id,
                data,
            } => {
                let result = self.store.upsert(collection, &id, &data);
                vec![self.write_outcome(collection, id, result)]
            }
            SyncCommand::Delete { collection, id } => {
                let result = self.store.delete(collection, &id);
                vec![self.write_outcome(collection, id, result)]
            }
            SyncCommand::SaveSetting { key, value } => {
                let result = self.store.upsert_setting(&key, &value);
                vec![self.write_outcome(Collection::Settings, key, result)]
            }
            SyncCommand::GenerateNarrative { player, draft } => {
                let Some(generator) = self.generator.as_ref() else {
                    return vec![Delta::NarrativeFailed {
                        player_id: player.id,
                        error: "narrative generation is not configured".to_string(),
                    }];
                };
                match generate_narrative(generator.as_ref(), &player, &draft) {
                    Ok(narrative) => vec![Delta::NarrativeReady {
                        player_id: player.id,
                        narrative,
                    }],
                    Err(err) => vec![Delta::NarrativeFailed {
                        player_id: player.id,
                        error: format!("{err:#}"),
                    }],
                }
            }
            SyncCommand::AskCoach {
                player,
                report,
                question,
            } => {
                let answer = match self.generator.as_ref() {
                    Some(generator) => ask_coach(generator.as_ref(), &question, &report, &player),
                    None => ASK_COACH_FALLBACK.to_string(),
                };
                vec![Delta::CoachAnswer {
                    player_id: player.id,
                    question,
                    answer,
                }]
            }
        }
    }

    /// Starts the worker thread. Generator requests run on the rayon pool so saves are not
    /// queued behind them; a change watcher is started once the initial load succeeds.
    pub fn spawn(self, tx: Sender<Delta>, cmd_rx: Receiver<SyncCommand>, poll: Duration) {
        thread::spawn(move || {
            let mut watcher: Option<Subscription> = None;
            loop {
                let Ok(cmd) = cmd_rx.recv() else {
                    break;
                };

                if let SyncCommand::GenerateNarrative { .. } | SyncCommand::AskCoach { .. } = cmd {
                    let worker = self.clone();
                    let tx = tx.clone();
                    rayon::spawn(move || {
                        for delta in worker.execute(cmd) {
                            let _ = tx.send(delta);
                        }
                    });
                    continue;
                }

                let deltas = self.execute(cmd);
                let loaded = deltas.iter().any(|d| matches!(d, Delta::Loaded(_)));
                for delta in deltas {
                    if tx.send(delta).is_err() {
                        return;
                    }
                }
                if loaded && watcher.is_none() {
                    watcher = Some(self.watch_changes(tx.clone(), poll));
                }
            }
            drop(watcher);
        });
    }

    fn watch_changes(&self, tx: Sender<Delta>, poll: Duration) -> Subscription {
        let worker = self.clone();
        subscribe(
            self.store.clone(),
            &WATCHED_COLLECTIONS,
            poll,
            move |notice| match notice {
                Ok(notice) => {
                    let refetched = worker.on_remote_change(&notice);
                    let _ = tx.send(Delta::RemoteChanged(notice));
                    let _ = tx.send(refetched);
                }
                Err(err) => {
                    let _ = tx.send(Delta::Log(format!("[WARN] Change poll failed: {err:#}")));
                }
            },
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewPlayer {
    pub name: String,
    pub branch: Branch,
    pub team_id: Option<String>,
    pub position: String,
    pub jersey_number: Option<u32>,
    pub access_code: String,
}

#[derive(Debug, Clone, Default)]
pub struct NewCoach {
    pub name: String,
    pub email: String,
    pub instagram_handle: Option<String>,
    pub password: Option<String>,
    pub assigned_teams: Vec<String>,
    pub is_admin: bool,
}

/// The UI-side half of synchronisation. Local state changes first; the store write is handed
/// to the worker and its outcome comes back as a [`Delta`].
pub struct SyncCoordinator {
    pub state: PortalState,
    cmd_tx: Sender<SyncCommand>,
}

impl SyncCoordinator {
    pub fn new(cmd_tx: Sender<SyncCommand>) -> Self {
        Self {
            state: PortalState::new(),
            cmd_tx,
        }
    }

    fn send(&self, cmd: SyncCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow!("sync worker is not running"))
    }

    pub fn initial_load(&mut self) -> Result<()> {
        self.state.status = LoadStatus::Loading;
        self.send(SyncCommand::InitialLoad)
    }

    pub fn refetch(&mut self) -> Result<()> {
        self.send(SyncCommand::Refetch)
    }

    pub fn apply_delta(&mut self, delta: Delta) {
        apply_delta(&mut self.state, delta);
    }

    pub fn drain(&mut self, rx: &Receiver<Delta>) -> usize {
        let mut n = 0;
        while let Ok(delta) = rx.try_recv() {
            self.apply_delta(delta);
            n += 1;
        }
        n
    }

    /// Replaces the entity locally right away and queues the remote upsert. There is no
    /// rollback: a failed write is reported through [`WriteOutcome::Failed`].
    pub fn apply_optimistic_update(&mut self, entity: Entity) -> Result<()> {
        let collection = entity.collection();
        let id = entity.id().to_string();
        let data = entity.to_value()?;
        self.state.put_local(entity);
        self.state.mark_pending(collection, &id);
        let sent = self.send(SyncCommand::Upsert {
            collection,
            id: id.clone(),
            data,
        });
        if sent.is_err() {
            self.state
                .push_log(format!("[ERROR] Could not queue save for {} {id}", collection.table()));
        }
        sent
    }

    fn delete_entity(&mut self, collection: Collection, id: &str) -> Result<()> {
        self.state.remove_local(collection, id);
        self.state.mark_pending(collection, id);
        self.send(SyncCommand::Delete {
            collection,
            id: id.to_string(),
        })
    }

    pub fn delete_player(&mut self, id: &str) -> Result<()> {
        self.state.drafts.discard_draft(id);
        if self.state.drafts.active_id() == Some(id) {
            self.state.drafts.clear_selection();
        }
        self.delete_entity(Collection::Players, id)
    }

    pub fn login_coach(&mut self, identifier: &str, password: &str) -> Result<(), LoginError> {
        let coach = auth::login_coach(&self.state.coaches, identifier, password)?;
        let coach_id = coach.id.clone();
        let line = format!("[INFO] Coach {} signed in", coach.name);
        self.state.push_log(line);
        self.state.session = Some(Session::Coach { coach_id });
        Ok(())
    }

    pub fn login_parent(&mut self, name_or_id: &str, access_code: &str) -> Result<(), LoginError> {
        let player = auth::login_parent(&self.state.players, name_or_id, access_code)?;
        let player_id = player.id.clone();
        self.state.session = Some(Session::Parent { player_id });
        Ok(())
    }

    pub fn logout(&mut self) {
        self.state.session = None;
        self.state.drafts.clear_selection();
    }

    pub fn select_player(&mut self, id: &str) -> Result<()> {
        if self.state.player(id).is_none() {
            bail!("unknown player {id}");
        }
        let coach_id = self.state.current_coach_id().map(|s| s.to_string());
        self.state.drafts.select_player(id, coach_id.as_deref());
        Ok(())
    }

    /// Asks the worker for a narrative for the active draft. Only one request per player may be
    /// in flight.
    pub fn request_narrative(&mut self) -> Result<()> {
        let Some(player_id) = self.state.drafts.active_id().map(|s| s.to_string()) else {
            bail!("no player selected");
        };
        if self.state.narrative_inflight.contains(&player_id) {
            bail!("narrative already being generated");
        }
        let player = self
            .state
            .player(&player_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown player {player_id}"))?;
        let draft = self
            .state
            .drafts
            .active()
            .cloned()
            .ok_or_else(|| anyhow!("no draft for {player_id}"))?;
        self.send(SyncCommand::GenerateNarrative { player, draft })?;
        self.state.narrative_inflight.insert(player_id);
        Ok(())
    }

    /// Sends a parent's question about the newest report of the signed-in parent's player.
    pub fn ask_about_latest_report(&mut self, question: &str) -> Result<()> {
        let question = question.trim();
        if question.is_empty() {
            bail!("type a question first");
        }
        let Some(Session::Parent { player_id }) = &self.state.session else {
            bail!("only a signed-in parent can ask about a report");
        };
        let player = self
            .state
            .player(player_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown player {player_id}"))?;
        let report = sorted_reports(&player)
            .first()
            .map(|r| (*r).clone())
            .ok_or_else(|| anyhow!("no report card has been published yet"))?;
        self.send(SyncCommand::AskCoach {
            player,
            report,
            question: question.to_string(),
        })
    }

    pub fn is_generating(&self, player_id: &str) -> bool {
        self.state.narrative_inflight.contains(player_id)
    }

    /// Publishes the active draft: assembles the card, saves the player optimistically and
    /// drops the draft.
    pub fn publish(&mut self) -> Result<Player> {
        let Some(player_id) = self.state.drafts.active_id().map(|s| s.to_string()) else {
            bail!("no player selected");
        };
        let current_coach = self
            .state
            .current_coach()
            .cloned()
            .ok_or_else(|| anyhow!("only a signed-in coach can publish"))?;
        let player = self
            .state
            .player(&player_id)
            .ok_or_else(|| anyhow!("unknown player {player_id}"))?;
        let draft = self
            .state
            .drafts
            .active()
            .ok_or_else(|| anyhow!("no draft for {player_id}"))?;
        let ctx = PublishContext {
            current_coach: &current_coach,
            coaches: &self.state.coaches,
            now: Utc::now(),
            report_id: new_id("rc"),
        };
        let updated = assemble(draft, player, draft.narrative.as_ref(), &ctx)?;

        self.state.drafts.discard_draft(&player_id);
        self.state.drafts.clear_selection();
        self.apply_optimistic_update(Entity::Player(updated.clone()))?;
        self.state.push_alert("Report Card Published Successfully!");
        Ok(updated)
    }

    pub fn add_player(&mut self, new: NewPlayer) -> Result<String> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            bail!("player name is required");
        }
        let team_id = if new.branch.uses_team() {
            Some(
                new.team_id
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| UNASSIGNED_TEAM_ID.to_string()),
            )
        } else {
            None
        };
        let player = Player {
            id: new_id("p"),
            image_url: avatar_url(&name),
            name,
            branch: new.branch,
            team_id,
            position: new.position,
            jersey_number: match new.branch {
                Branch::Academy => Some(new.jersey_number.unwrap_or(0)),
                _ => None,
            },
            access_code: new.access_code,
            report_cards: Vec::new(),
            schema_version: SCHEMA_VERSION,
        };
        let id = player.id.clone();
        self.apply_optimistic_update(Entity::Player(player))?;
        Ok(id)
    }

    pub fn update_player_details(
        &mut self,
        id: &str,
        name: &str,
        team_id: Option<&str>,
        position: &str,
    ) -> Result<()> {
        let mut player = self
            .state
            .player(id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown player {id}"))?;
        player.name = name.trim().to_string();
        player.position = position.to_string();
        if player.branch.uses_team() {
            player.team_id = Some(
                team_id
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or(UNASSIGNED_TEAM_ID)
                    .to_string(),
            );
        }
        self.apply_optimistic_update(Entity::Player(player))
    }

    pub fn set_player_photo(&mut self, id: &str, path: &Path) -> Result<()> {
        let mut player = self
            .state
            .player(id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown player {id}"))?;
        player.image_url = image_data_url(path)?;
        self.apply_optimistic_update(Entity::Player(player))
    }

    pub fn add_team(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            bail!("team name is required");
        }
        self.apply_optimistic_update(Entity::Team(Team {
            id: name.to_string(),
            name: name.to_string(),
        }))
    }

    /// Adds teams whose ids do not exist yet. Returns how many were created.
    pub fn add_teams(&mut self, names: &[String]) -> Result<usize> {
        let mut created = 0;
        for name in names {
            if self.state.teams.iter().any(|t| t.id == *name) {
                continue;
            }
            self.add_team(name)?;
            created += 1;
        }
        Ok(created)
    }

    /// Deletes a team. Its players move to the unassigned team and coaches lose the assignment.
    pub fn delete_team(&mut self, team_id: &str) -> Result<()> {
        if team_id == UNASSIGNED_TEAM_ID {
            bail!("the unassigned team cannot be deleted");
        }
        let orphans: Vec<Player> = self
            .state
            .players
            .iter()
            .filter(|p| p.team_id.as_deref() == Some(team_id))
            .cloned()
            .collect();
        for mut player in orphans {
            player.team_id = Some(UNASSIGNED_TEAM_ID.to_string());
            self.apply_optimistic_update(Entity::Player(player))?;
        }
        let coaches: Vec<Coach> = self
            .state
            .coaches
            .iter()
            .filter(|c| c.assigned_teams.iter().any(|t| t == team_id))
            .cloned()
            .collect();
        for mut coach in coaches {
            coach.assigned_teams.retain(|t| t != team_id);
            self.apply_optimistic_update(Entity::Coach(coach))?;
        }
        self.delete_entity(Collection::Teams, team_id)
    }

    pub fn add_coach(&mut self, new: NewCoach) -> Result<String> {
        let name = new.name.trim().to_string();
        if name.is_empty() {
            bail!("coach name is required");
        }
        let coach = Coach {
            id: new_id("coach"),
            image_url: Some(avatar_url(&name)),
            name,
            role: UserRole::Coach,
            email: new.email.trim().to_string(),
            instagram_handle: new.instagram_handle.filter(|h| !h.trim().is_empty()),
            password: Some(
                new.password
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| DEFAULT_COACH_PASSWORD.to_string()),
            ),
            assigned_teams: new.assigned_teams,
            is_admin: new.is_admin,
        };
        let id = coach.id.clone();
        self.apply_optimistic_update(Entity::Coach(coach))?;
        Ok(id)
    }

    pub fn update_coach(&mut self, coach: Coach) -> Result<()> {
        self.apply_optimistic_update(Entity::Coach(coach))
    }

    pub fn set_logo(&mut self, value: &str) -> Result<()> {
        self.state.logo = value.to_string();
        self.state
            .mark_pending(Collection::Settings, LOGO_SETTING_KEY);
        self.send(SyncCommand::SaveSetting {
            key: LOGO_SETTING_KEY.to_string(),
            value: value.to_string(),
        })
    }

    pub fn set_logo_from_file(&mut self, path: &Path) -> Result<()> {
        let url = image_data_url(path)?;
        self.set_logo(&url)
    }
}
