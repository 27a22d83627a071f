use std::collections::{HashMap, HashSet, VecDeque};
use std::time::SystemTime;

use anyhow::{Context, Result};
use serde_json::Value;

use crate::draft::{Draft, DraftBuffer};
use crate::model::{Coach, Narrative, Player, ReportCard, Team};
use crate::store::{ChangeNotice, Collection};

const LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
    /// The store itself is unusable. Nothing is substituted; the operator has to fix config.
    NotConfigured(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Session {
    Coach { coach_id: String },
    Parent { player_id: String },
}

/// Any entity that is written as one `{id, data}` row.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Player(Player),
    Coach(Coach),
    Team(Team),
}

impl Entity {
    pub fn collection(&self) -> Collection {
        match self {
            Entity::Player(_) => Collection::Players,
            Entity::Coach(_) => Collection::Coaches,
            Entity::Team(_) => Collection::Teams,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Entity::Player(p) => &p.id,
            Entity::Coach(c) => &c.id,
            Entity::Team(t) => &t.id,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        match self {
            Entity::Player(p) => serde_json::to_value(p),
            Entity::Coach(c) => serde_json::to_value(c),
            Entity::Team(t) => serde_json::to_value(t),
        }
        .with_context(|| format!("serialize {} {}", self.collection().table(), self.id()))
    }
}

/// Result of one fetch round. `None` means that collection could not be read and the local copy
/// should be kept.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub players: Option<Vec<Player>>,
    pub coaches: Option<Vec<Coach>>,
    pub teams: Option<Vec<Team>>,
    pub logo: Option<String>,
    /// Write sequence observed before fetching started.
    pub write_seq: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Persisted {
        collection: Collection,
        id: String,
        seq: u64,
    },
    Failed {
        collection: Collection,
        id: String,
        seq: u64,
        error: String,
    },
}

impl WriteOutcome {
    pub fn key(&self) -> (Collection, &str) {
        match self {
            WriteOutcome::Persisted { collection, id, .. }
            | WriteOutcome::Failed { collection, id, .. } => (*collection, id.as_str()),
        }
    }

    pub fn seq(&self) -> u64 {
        match self {
            WriteOutcome::Persisted { seq, .. } | WriteOutcome::Failed { seq, .. } => *seq,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, WriteOutcome::Persisted { .. })
    }
}

#[derive(Debug, Clone)]
pub enum Delta {
    Loaded(Snapshot),
    LoadFailed(String),
    RemoteChanged(ChangeNotice),
    Refetched(Snapshot),
    Write(WriteOutcome),
    NarrativeReady {
        player_id: String,
        narrative: Narrative,
    },
    NarrativeFailed {
        player_id: String,
        error: String,
    },
    CoachAnswer {
        player_id: String,
        question: String,
        answer: String,
    },
    Log(String),
}

#[derive(Debug, Clone)]
pub enum SyncCommand {
    InitialLoad,
    Refetch,
    Upsert {
        collection: Collection,
        id: String,
        data: Value,
    },
    Delete {
        collection: Collection,
        id: String,
    },
    SaveSetting {
        key: String,
        value: String,
    },
    GenerateNarrative {
        player: Player,
        draft: Draft,
    },
    AskCoach {
        player: Player,
        report: ReportCard,
        question: String,
    },
}

type EntityKey = (Collection, String);

#[derive(Debug, Clone)]
pub struct PortalState {
    pub status: LoadStatus,
    pub session: Option<Session>,
    pub players: Vec<Player>,
    pub coaches: Vec<Coach>,
    pub teams: Vec<Team>,
    pub logo: String,
    pub drafts: DraftBuffer,
    pub narrative_inflight: HashSet<String>,
    pub pending_writes: HashMap<EntityKey, usize>,
    pub acked_writes: HashMap<EntityKey, u64>,
    pub last_synced: Option<SystemTime>,
    pub logs: VecDeque<String>,
    pub alerts: VecDeque<String>,
}

impl Default for PortalState {
    fn default() -> Self {
        Self::new()
    }
}

impl PortalState {
    pub fn new() -> Self {
        Self {
            status: LoadStatus::Loading,
            session: None,
            players: Vec::new(),
            coaches: Vec::new(),
            teams: Vec::new(),
            logo: String::new(),
            drafts: DraftBuffer::new(),
            narrative_inflight: HashSet::new(),
            pending_writes: HashMap::new(),
            acked_writes: HashMap::new(),
            last_synced: None,
            logs: VecDeque::with_capacity(LOG_CAPACITY),
            alerts: VecDeque::new(),
        }
    }

    pub fn push_log(&mut self, line: impl Into<String>) {
        if self.logs.len() >= LOG_CAPACITY {
            self.logs.pop_front();
        }
        self.logs.push_back(line.into());
    }

    pub fn push_alert(&mut self, message: impl Into<String>) {
        self.alerts.push_back(message.into());
    }

    pub fn take_alert(&mut self) -> Option<String> {
        self.alerts.pop_front()
    }

    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn coach(&self, id: &str) -> Option<&Coach> {
        self.coaches.iter().find(|c| c.id == id)
    }

    pub fn current_coach(&self) -> Option<&Coach> {
        match &self.session {
            Some(Session::Coach { coach_id }) => self.coach(coach_id),
            _ => None,
        }
    }

    pub fn current_coach_id(&self) -> Option<&str> {
        match &self.session {
            Some(Session::Coach { coach_id }) => Some(coach_id.as_str()),
            _ => None,
        }
    }

    pub fn has_pending_writes(&self) -> bool {
        self.pending_writes.values().any(|n| *n > 0)
    }

    /// Replaces (or adds) an entity locally by id.
    pub fn put_local(&mut self, entity: Entity) {
        match entity {
            Entity::Player(p) => upsert_by_id(&mut self.players, p, |x| &x.id),
            Entity::Coach(c) => upsert_by_id(&mut self.coaches, c, |x| &x.id),
            Entity::Team(t) => upsert_by_id(&mut self.teams, t, |x| &x.id),
        }
    }

    pub fn remove_local(&mut self, collection: Collection, id: &str) {
        match collection {
            Collection::Players => self.players.retain(|p| p.id != id),
            Collection::Coaches => self.coaches.retain(|c| c.id != id),
            Collection::Teams => self.teams.retain(|t| t.id != id),
            Collection::Settings => {}
        }
    }

    pub fn mark_pending(&mut self, collection: Collection, id: &str) {
        *self
            .pending_writes
            .entry((collection, id.to_string()))
            .or_insert(0) += 1;
    }

    fn settle_write(&mut self, outcome: &WriteOutcome) {
        let (collection, id) = outcome.key();
        let key = (collection, id.to_string());
        if let Some(count) = self.pending_writes.get_mut(&key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.pending_writes.remove(&key);
            }
        }
        let seq = self.acked_writes.entry(key).or_insert(0);
        *seq = (*seq).max(outcome.seq());
    }

    /// Local edits the snapshot may not contain yet: still in flight, or acknowledged after the
    /// snapshot started fetching.
    fn protected(&self, collection: Collection, snapshot_seq: u64) -> Vec<String> {
        let mut ids: HashSet<String> = self
            .pending_writes
            .iter()
            .filter(|((c, _), n)| *c == collection && **n > 0)
            .map(|((_, id), _)| id.clone())
            .collect();
        ids.extend(
            self.acked_writes
                .iter()
                .filter(|((c, _), seq)| *c == collection && **seq > snapshot_seq)
                .map(|((_, id), _)| id.clone()),
        );
        ids.into_iter().collect()
    }

    fn replace_from_snapshot(&mut self, snapshot: Snapshot) {
        let seq = snapshot.write_seq;
        if let Some(players) = snapshot.players {
            let protected = self.protected(Collection::Players, seq);
            self.players = merge_protected(players, &self.players, &protected, |p| &p.id);
        }
        if let Some(coaches) = snapshot.coaches {
            let protected = self.protected(Collection::Coaches, seq);
            self.coaches = merge_protected(coaches, &self.coaches, &protected, |c| &c.id);
        }
        if let Some(teams) = snapshot.teams {
            let protected = self.protected(Collection::Teams, seq);
            self.teams = merge_protected(teams, &self.teams, &protected, |t| &t.id);
        }
        if let Some(logo) = snapshot.logo {
            let logo_protected = self
                .pending_writes
                .keys()
                .any(|(c, _)| *c == Collection::Settings)
                || self
                    .acked_writes
                    .iter()
                    .any(|((c, _), s)| *c == Collection::Settings && *s > seq);
            if !logo_protected {
                self.logo = logo;
            }
        }
        for warning in snapshot.warnings {
            self.push_log(format!("[WARN] {warning}"));
        }
        // Acks older than this snapshot are now reflected remotely.
        self.acked_writes.retain(|_, s| *s > seq);
        let ids: Vec<String> = self.players.iter().map(|p| p.id.clone()).collect();
        self.drafts.retain_players(ids.iter().map(|s| s.as_str()));
        self.last_synced = Some(SystemTime::now());
    }
}

fn upsert_by_id<T>(items: &mut Vec<T>, item: T, id: impl Fn(&T) -> &String) {
    let key = id(&item).clone();
    match items.iter().position(|x| *id(x) == key) {
        Some(idx) => items[idx] = item,
        None => items.push(item),
    }
}

fn merge_protected<T: Clone>(
    mut fresh: Vec<T>,
    local: &[T],
    protected: &[String],
    id: impl Fn(&T) -> &String,
) -> Vec<T> {
    for pid in protected {
        match local.iter().find(|x| id(*x) == pid) {
            Some(mine) => upsert_by_id(&mut fresh, mine.clone(), &id),
            // Protected but gone locally: a delete that has not landed remotely yet.
            None => fresh.retain(|x| id(x) != pid),
        }
    }
    fresh
}

pub fn apply_delta(state: &mut PortalState, delta: Delta) {
    match delta {
        Delta::Loaded(snapshot) => {
            let players = snapshot.players.as_ref().map_or(0, |p| p.len());
            let coaches = snapshot.coaches.as_ref().map_or(0, |c| c.len());
            let teams = snapshot.teams.as_ref().map_or(0, |t| t.len());
            state.replace_from_snapshot(snapshot);
            state.status = LoadStatus::Ready;
            state.push_log(format!(
                "[INFO] Loaded {players} players, {coaches} coaches, {teams} teams"
            ));
        }
        Delta::LoadFailed(reason) => {
            state.push_log(format!("[ERROR] Store not configured: {reason}"));
            state.status = LoadStatus::NotConfigured(reason);
        }
        Delta::RemoteChanged(notice) => {
            let names: Vec<&str> = notice.collections.iter().map(|c| c.table()).collect();
            state.push_log(format!("[INFO] Remote change in {}", names.join(", ")));
        }
        Delta::Refetched(snapshot) => {
            state.replace_from_snapshot(snapshot);
            state.push_log("[INFO] Refetched all collections");
        }
        Delta::Write(outcome) => {
            state.settle_write(&outcome);
            match outcome {
                WriteOutcome::Persisted { collection, id, .. } => {
                    state.push_log(format!("[INFO] Saved {} {id}", collection.table()));
                }
                WriteOutcome::Failed {
                    collection,
                    id,
                    error,
                    ..
                } => {
                    state.push_log(format!(
                        "[ERROR] Save failed for {} {id}: {error}",
                        collection.table()
                    ));
                    state.push_alert(format!(
                        "Failed to save to the cloud ({} {id}). Your change is kept on this \
                         screen but may be lost on reload.",
                        collection.table()
                    ));
                }
            }
        }
        Delta::NarrativeReady {
            player_id,
            narrative,
        } => {
            state.narrative_inflight.remove(&player_id);
            if state.drafts.store_narrative(&player_id, narrative) {
                state.push_log(format!("[INFO] Narrative ready for {player_id}"));
            } else {
                state.push_log(format!(
                    "[WARN] Narrative for {player_id} arrived after its draft was gone"
                ));
            }
        }
        Delta::NarrativeFailed { player_id, error } => {
            state.narrative_inflight.remove(&player_id);
            state.push_log(format!("[WARN] Narrative failed for {player_id}: {error}"));
            state.push_alert("Error generating feedback. Please try again.");
        }
        Delta::CoachAnswer {
            player_id,
            question,
            answer,
        } => {
            state.push_log(format!("[INFO] Answered a question about {player_id}"));
            state.push_alert(format!("Q: {question}\n\n{answer}"));
        }
        Delta::Log(line) => state.push_log(line),
    }
}
