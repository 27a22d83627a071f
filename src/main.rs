use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, bail};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::prelude::*;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Clear, Paragraph};

use coach_portal::config::PortalConfig;
use coach_portal::draft::Draft;
use coach_portal::model::{Branch, Player, STAT_GROUPS, stat_template};
use coach_portal::narrative::NarrativeGenerator;
use coach_portal::state::{Delta, LoadStatus, PortalState, Session};
use coach_portal::sync::{NewCoach, NewPlayer, SyncCoordinator, SyncWorker};
use coach_portal::views::{
    bulk_team_names, category_trend, sorted_reports, team_rating, visible_players,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Roster,
    Draft,
    Reports,
}

enum Login {
    Coach { identifier: String, password: String },
    Parent { name: String, code: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptKind {
    CoachLogin,
    ParentLogin,
    CoachNotes,
    AttendanceNote,
    CoachComment,
    FooterNote,
    Season,
    Quarter,
    Strength,
    Target,
    AddPlayer,
    EditPlayer,
    PlayerPhoto,
    DeletePlayer,
    AddTeams,
    DeleteTeam,
    AddCoach,
    EditProfile,
    Logo,
    AskCoach,
}

impl PromptKind {
    fn title(self) -> &'static str {
        match self {
            PromptKind::CoachLogin => "Coach sign-in: <email or name> <password>",
            PromptKind::ParentLogin => "Parent sign-in: <player name> <access code>",
            PromptKind::CoachNotes => "Coach notes (used to write the feedback)",
            PromptKind::AttendanceNote => "Attendance note",
            PromptKind::CoachComment => "Application / behaviour comment",
            PromptKind::FooterNote => "Footer note",
            PromptKind::Season => "Season",
            PromptKind::Quarter => "Term",
            PromptKind::Strength => "Add strength",
            PromptKind::Target => "Add target",
            PromptKind::AddPlayer => {
                "New player: name, team, position, number, branch (academy/coaching/tech)"
            }
            PromptKind::EditPlayer => "Edit player: name, team, position",
            PromptKind::PlayerPhoto => "Photo file path",
            PromptKind::DeletePlayer => "Delete this player? type yes",
            PromptKind::AddTeams => "Add teams: ages / names (e.g. U9, U10 / Reds, Blues)",
            PromptKind::DeleteTeam => "Delete team (players move to Unassigned)",
            PromptKind::AddCoach => "New coach: name, email, team, team...",
            PromptKind::EditProfile => "Your profile: name, email, instagram",
            PromptKind::Logo => "Logo: image file path or URL",
            PromptKind::AskCoach => "Ask the coach about the latest report",
        }
    }
}

struct Prompt {
    kind: PromptKind,
    buffer: String,
}

struct App {
    coord: SyncCoordinator,
    should_quit: bool,
    screen: Screen,
    selected: usize,
    skill_cursor: usize,
    help_overlay: bool,
    alert: Option<String>,
    login: Option<Login>,
    prompt: Option<Prompt>,
}

impl App {
    fn new(coord: SyncCoordinator, login: Option<Login>) -> Self {
        Self {
            coord,
            should_quit: false,
            screen: Screen::Roster,
            selected: 0,
            skill_cursor: 0,
            help_overlay: false,
            alert: None,
            login,
            prompt: None,
        }
    }

    fn state(&self) -> &PortalState {
        &self.coord.state
    }

    fn roster(&self) -> Vec<&Player> {
        let state = self.state();
        match &state.session {
            Some(Session::Coach { .. }) => match state.current_coach() {
                Some(coach) => visible_players(coach, &state.players),
                None => Vec::new(),
            },
            Some(Session::Parent { player_id }) => state.player(player_id).into_iter().collect(),
            None => Vec::new(),
        }
    }

    fn selected_player_id(&self) -> Option<String> {
        self.roster().get(self.selected).map(|p| p.id.clone())
    }

    fn is_coach(&self) -> bool {
        matches!(self.state().session, Some(Session::Coach { .. }))
    }

    fn is_admin(&self) -> bool {
        self.state().current_coach().is_some_and(|c| c.is_admin)
    }

    /// Signs in once the first load has brought coaches and players in.
    fn try_login(&mut self) {
        if self.state().status != LoadStatus::Ready {
            return;
        }
        let Some(login) = self.login.take() else {
            return;
        };
        let result = match &login {
            Login::Coach {
                identifier,
                password,
            } => self.coord.login_coach(identifier, password),
            Login::Parent { name, code } => self.coord.login_parent(name, code),
        };
        if let Err(err) = result {
            self.coord.state.push_log(format!("[WARN] Sign-in failed: {err}"));
            self.alert = Some(format!("Sign-in failed: {err}"));
        } else if matches!(login, Login::Parent { .. }) {
            self.screen = Screen::Reports;
        }
    }

    fn open_prompt(&mut self, kind: PromptKind, buffer: impl Into<String>) {
        self.prompt = Some(Prompt {
            kind,
            buffer: buffer.into(),
        });
    }

    fn on_key(&mut self, key: KeyEvent) {
        if self.alert.take().is_some() {
            return;
        }
        if self.prompt.is_some() {
            self.on_prompt_key(key);
            return;
        }
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('?') => self.help_overlay = !self.help_overlay,
            KeyCode::Char('R') => self.report(|c| c.refetch()),
            _ if self.state().session.is_none() => self.on_signed_out_key(key),
            _ => match self.screen {
                Screen::Roster => self.on_roster_key(key),
                Screen::Draft => self.on_draft_key(key),
                Screen::Reports => self.on_reports_key(key),
            },
        }
    }

    fn on_prompt_key(&mut self, key: KeyEvent) {
        let Some(prompt) = self.prompt.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.prompt = None,
            KeyCode::Backspace => {
                prompt.buffer.pop();
            }
            KeyCode::Char(c) => prompt.buffer.push(c),
            KeyCode::Enter => {
                if let Some(prompt) = self.prompt.take()
                    && let Err(err) = self.submit_prompt(prompt)
                {
                    self.coord.state.push_log(format!("[WARN] {err:#}"));
                    self.alert = Some(format!("{err:#}"));
                }
            }
            _ => {}
        }
    }

    fn on_signed_out_key(&mut self, key: KeyEvent) {
        if self.state().status != LoadStatus::Ready {
            return;
        }
        match key.code {
            KeyCode::Char('l') => self.open_prompt(PromptKind::CoachLogin, ""),
            KeyCode::Char('p') => self.open_prompt(PromptKind::ParentLogin, ""),
            _ => {}
        }
    }

    fn on_roster_key(&mut self, key: KeyEvent) {
        let admin = self.is_admin();
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                let total = self.roster().len();
                if self.selected + 1 < total {
                    self.selected += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Char('d') | KeyCode::Enter if self.is_coach() => {
                if let Some(id) = self.selected_player_id() {
                    self.report(|c| c.select_player(&id));
                    self.skill_cursor = 0;
                    self.screen = Screen::Draft;
                }
            }
            KeyCode::Char('r') => {
                if self.selected_player_id().is_some() {
                    self.screen = Screen::Reports;
                }
            }
            KeyCode::Char('a') => self.open_prompt(PromptKind::AddPlayer, ""),
            KeyCode::Char('e') => {
                let current = self
                    .selected_player_id()
                    .and_then(|id| self.state().player(&id).cloned());
                if let Some(p) = current {
                    let team = p.team_id.unwrap_or_default();
                    self.open_prompt(
                        PromptKind::EditPlayer,
                        format!("{}, {team}, {}", p.name, p.position),
                    );
                }
            }
            KeyCode::Char('i') if self.selected_player_id().is_some() => {
                self.open_prompt(PromptKind::PlayerPhoto, "")
            }
            KeyCode::Char('x') if self.selected_player_id().is_some() => {
                self.open_prompt(PromptKind::DeletePlayer, "")
            }
            KeyCode::Char('m') => {
                if let Some(coach) = self.state().current_coach() {
                    let text = format!(
                        "{}, {}, {}",
                        coach.name,
                        coach.email,
                        coach.instagram_handle.as_deref().unwrap_or_default()
                    );
                    self.open_prompt(PromptKind::EditProfile, text);
                }
            }
            KeyCode::Char('t') if admin => self.open_prompt(PromptKind::AddTeams, ""),
            KeyCode::Char('X') if admin => {
                let team = self
                    .selected_player_id()
                    .and_then(|id| self.state().player(&id).and_then(|p| p.team_id.clone()))
                    .unwrap_or_default();
                self.open_prompt(PromptKind::DeleteTeam, team);
            }
            KeyCode::Char('c') if admin => self.open_prompt(PromptKind::AddCoach, ""),
            KeyCode::Char('L') if admin => {
                let logo = self.state().logo.clone();
                self.open_prompt(PromptKind::Logo, logo);
            }
            KeyCode::Char('o') => self.sign_out(),
            _ => {}
        }
    }

    fn on_draft_key(&mut self, key: KeyEvent) {
        let skills: Vec<&'static str> = stat_template().map(|(_, name)| name).collect();
        let Some(draft) = self.state().drafts.active().cloned() else {
            self.screen = Screen::Roster;
            return;
        };
        match key.code {
            KeyCode::Char('b') | KeyCode::Esc => {
                self.coord.state.drafts.clear_selection();
                self.screen = Screen::Roster;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                if self.skill_cursor + 1 < skills.len() {
                    self.skill_cursor += 1;
                }
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.skill_cursor = self.skill_cursor.saturating_sub(1)
            }
            KeyCode::Char('l') | KeyCode::Right | KeyCode::Char('+') => {
                self.bump_skill(skills[self.skill_cursor], 1)
            }
            KeyCode::Char('h') | KeyCode::Left | KeyCode::Char('-') => {
                self.bump_skill(skills[self.skill_cursor], -1)
            }
            KeyCode::Char('a') => self.edit_draft(|d| {
                let next = cycle_score(d.attendance.attendance_score);
                d.set_attendance(next, d.attendance.commitment_score)
            }),
            KeyCode::Char('c') => self.edit_draft(|d| {
                let next = cycle_score(d.attendance.commitment_score);
                d.set_attendance(d.attendance.attendance_score, next)
            }),
            KeyCode::Char('x') => self.edit_draft(|d| {
                let next = cycle_score(d.ratings.application_score);
                d.set_ratings(next, d.ratings.behaviour_score)
            }),
            KeyCode::Char('v') => self.edit_draft(|d| {
                let next = cycle_score(d.ratings.behaviour_score);
                d.set_ratings(d.ratings.application_score, next)
            }),
            KeyCode::Char('n') => self.open_prompt(PromptKind::CoachNotes, draft.coach_notes),
            KeyCode::Char('A') => {
                self.open_prompt(PromptKind::AttendanceNote, draft.attendance.note)
            }
            KeyCode::Char('C') => {
                self.open_prompt(PromptKind::CoachComment, draft.ratings.coach_comment)
            }
            KeyCode::Char('f') => self.open_prompt(PromptKind::FooterNote, draft.coach_footer_note),
            KeyCode::Char('e') => self.open_prompt(PromptKind::Season, draft.season),
            KeyCode::Char('E') => self.open_prompt(PromptKind::Quarter, draft.quarter),
            KeyCode::Char('s') => self.open_prompt(PromptKind::Strength, ""),
            KeyCode::Char('S') => self.edit_draft(|d| {
                if let Some(last) = d.manual_strengths.len().checked_sub(1) {
                    d.remove_strength(last);
                }
            }),
            KeyCode::Char('t') => self.open_prompt(PromptKind::Target, ""),
            KeyCode::Char('T') => self.edit_draft(|d| {
                if let Some(id) = d.targets.last().map(|t| t.id.clone()) {
                    d.toggle_target(&id);
                }
            }),
            KeyCode::Backspace => self.edit_draft(|d| {
                if let Some(id) = d.targets.last().map(|t| t.id.clone()) {
                    d.remove_target(&id);
                }
            }),
            KeyCode::Char('w') => {
                let ids: Vec<String> = self.state().coaches.iter().map(|c| c.id.clone()).collect();
                let next = next_author(&ids, draft.author_coach_id.as_deref());
                self.edit_draft(|d| d.author_coach_id = next);
            }
            KeyCode::Char('g') => self.report(|c| c.request_narrative()),
            KeyCode::Char('p') => match self.coord.publish() {
                Ok(player) => {
                    self.coord
                        .state
                        .push_log(format!("[INFO] Published report for {}", player.name));
                    self.screen = Screen::Roster;
                }
                Err(err) => {
                    self.coord.state.push_log(format!("[WARN] Publish failed: {err:#}"));
                    self.alert = Some(format!("{err:#}"));
                }
            },
            _ => {}
        }
    }

    fn on_reports_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('b') | KeyCode::Esc if self.is_coach() => self.screen = Screen::Roster,
            KeyCode::Char('a') if !self.is_coach() => self.open_prompt(PromptKind::AskCoach, ""),
            KeyCode::Char('o') => self.sign_out(),
            _ => {}
        }
    }

    fn sign_out(&mut self) {
        self.coord.logout();
        self.coord.state.push_log("[INFO] Signed out");
        self.screen = Screen::Roster;
        self.selected = 0;
    }

    fn submit_prompt(&mut self, prompt: Prompt) -> anyhow::Result<()> {
        let text = prompt.buffer.trim().to_string();
        match prompt.kind {
            PromptKind::CoachLogin => {
                let (identifier, password) = split_credentials(&text)
                    .ok_or_else(|| anyhow!("enter a login and a password"))?;
                self.coord.login_coach(identifier, password)?;
                self.screen = Screen::Roster;
            }
            PromptKind::ParentLogin => {
                let (name, code) = split_credentials(&text)
                    .ok_or_else(|| anyhow!("enter the player's name and access code"))?;
                self.coord.login_parent(name, code)?;
                self.screen = Screen::Reports;
            }
            PromptKind::CoachNotes => self.edit_draft(|d| d.coach_notes = text),
            PromptKind::AttendanceNote => self.edit_draft(|d| d.attendance.note = text),
            PromptKind::CoachComment => self.edit_draft(|d| d.ratings.coach_comment = text),
            PromptKind::FooterNote => self.edit_draft(|d| d.coach_footer_note = text),
            PromptKind::Season if !text.is_empty() => self.edit_draft(|d| d.season = text),
            PromptKind::Quarter if !text.is_empty() => self.edit_draft(|d| d.quarter = text),
            PromptKind::Season | PromptKind::Quarter => bail!("the value cannot be empty"),
            PromptKind::Strength => {
                if !self.coord.state.drafts.edit(|d| d.add_strength(&text))? {
                    bail!("strengths are limited to three");
                }
            }
            PromptKind::Target => {
                self.coord
                    .state
                    .drafts
                    .edit(|d| d.add_target(&text))?
                    .ok_or_else(|| anyhow!("the target needs a description"))?;
            }
            PromptKind::AddPlayer => {
                let new = parse_new_player(&text)?;
                let name = new.name.clone();
                self.coord.add_player(new)?;
                self.coord.state.push_log(format!("[INFO] Added player {name}"));
            }
            PromptKind::EditPlayer => {
                let id = self.require_selected()?;
                let fields = split_fields(&text);
                let name = fields.first().cloned().unwrap_or_default();
                if name.is_empty() {
                    bail!("player name is required");
                }
                let team = fields.get(1).map(|s| s.as_str());
                let position = fields.get(2).cloned().unwrap_or_default();
                self.coord.update_player_details(&id, &name, team, &position)?;
            }
            PromptKind::PlayerPhoto => {
                let id = self.require_selected()?;
                self.coord.set_player_photo(&id, Path::new(&text))?;
            }
            PromptKind::DeletePlayer => {
                if !text.eq_ignore_ascii_case("yes") {
                    return Ok(());
                }
                let id = self.require_selected()?;
                self.coord.delete_player(&id)?;
            }
            PromptKind::AddTeams => {
                let (ages, names) = text.split_once('/').unwrap_or((text.as_str(), ""));
                let created = self.coord.add_teams(&bulk_team_names(ages, names))?;
                self.coord
                    .state
                    .push_log(format!("[INFO] Created {created} teams"));
            }
            PromptKind::DeleteTeam => self.coord.delete_team(&text)?,
            PromptKind::AddCoach => {
                let fields = split_fields(&text);
                let new = NewCoach {
                    name: fields.first().cloned().unwrap_or_default(),
                    email: fields.get(1).cloned().unwrap_or_default(),
                    assigned_teams: fields.iter().skip(2).cloned().collect(),
                    ..NewCoach::default()
                };
                self.coord.add_coach(new)?;
            }
            PromptKind::EditProfile => {
                let mut coach = self
                    .state()
                    .current_coach()
                    .cloned()
                    .ok_or_else(|| anyhow!("no coach signed in"))?;
                let fields = split_fields(&text);
                if let Some(name) = fields.first().filter(|n| !n.is_empty()) {
                    coach.name = name.clone();
                }
                coach.email = fields.get(1).cloned().unwrap_or_default();
                coach.instagram_handle = fields.get(2).filter(|h| !h.is_empty()).cloned();
                self.coord.update_coach(coach)?;
            }
            PromptKind::Logo => {
                let path = Path::new(&text);
                if path.is_file() {
                    self.coord.set_logo_from_file(path)?;
                } else if text.starts_with("http") || text.starts_with("data:") {
                    self.coord.set_logo(&text)?;
                } else {
                    bail!("{text} is neither an image file nor a URL");
                }
            }
            PromptKind::AskCoach => self.coord.ask_about_latest_report(&text)?,
        }
        Ok(())
    }

    fn require_selected(&self) -> anyhow::Result<String> {
        self.selected_player_id()
            .ok_or_else(|| anyhow!("no player selected"))
    }

    fn edit_draft(&mut self, f: impl FnOnce(&mut Draft)) {
        self.report(|c| c.state.drafts.edit(f));
    }

    fn bump_skill(&mut self, name: &str, step: i16) {
        let current = self
            .state()
            .drafts
            .active()
            .and_then(|d| d.stat(name))
            .unwrap_or(3);
        let next = (i16::from(current) + step).clamp(1, 5) as u8;
        self.report(|c| c.state.drafts.set_stat(name, next));
    }

    fn report<T>(&mut self, f: impl FnOnce(&mut SyncCoordinator) -> anyhow::Result<T>) {
        if let Err(err) = f(&mut self.coord) {
            self.coord.state.push_log(format!("[WARN] {err:#}"));
        }
    }
}

fn split_fields(text: &str) -> Vec<String> {
    text.split(',').map(|s| s.trim().to_string()).collect()
}

/// Splits "<who> <secret>" at the last space, so names may contain spaces.
fn split_credentials(text: &str) -> Option<(&str, &str)> {
    let (who, secret) = text.trim().rsplit_once(char::is_whitespace)?;
    let who = who.trim();
    (!who.is_empty() && !secret.is_empty()).then_some((who, secret))
}

fn cycle_score(value: u8) -> u8 {
    value % 5 + 1
}

fn next_author(coach_ids: &[String], current: Option<&str>) -> Option<String> {
    if coach_ids.is_empty() {
        return None;
    }
    let next = current
        .and_then(|id| coach_ids.iter().position(|c| c == id))
        .map_or(0, |idx| (idx + 1) % coach_ids.len());
    Some(coach_ids[next].clone())
}

fn parse_new_player(text: &str) -> anyhow::Result<NewPlayer> {
    let fields = split_fields(text);
    let name = fields.first().cloned().unwrap_or_default();
    if name.is_empty() {
        bail!("player name is required");
    }
    let branch = match fields.get(4).map(|b| b.to_ascii_lowercase()).as_deref() {
        None | Some("") | Some("academy") => Branch::Academy,
        Some("coaching") => Branch::Coaching,
        Some("tech") | Some("tech centre") | Some("techcentre") => Branch::TechCentre,
        Some(other) => bail!("unknown branch {other}"),
    };
    let jersey_number = match fields.get(3).filter(|n| !n.is_empty()) {
        Some(n) => Some(n.parse::<u32>().with_context(|| format!("invalid number {n}"))?),
        None => None,
    };
    Ok(NewPlayer {
        name,
        branch,
        team_id: fields.get(1).filter(|t| !t.is_empty()).cloned(),
        position: fields.get(2).cloned().unwrap_or_default(),
        jersey_number,
        ..NewPlayer::default()
    })
}

fn main() -> io::Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");

    let config = PortalConfig::from_env();
    let login = parse_login_args();

    let (tx, rx) = mpsc::channel();
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let mut coord = SyncCoordinator::new(cmd_tx);

    match config.open_store() {
        Ok(store) => {
            let generator = config
                .narrative_client()
                .map(|client| Arc::new(client) as Arc<dyn NarrativeGenerator>);
            if generator.is_none() {
                coord
                    .state
                    .push_log("[WARN] GEMINI_API_KEY not set, feedback generation disabled");
            }
            SyncWorker::new(store, generator).spawn(tx, cmd_rx, config.sync_poll);
            if let Err(err) = coord.initial_load() {
                coord.state.push_log(format!("[ERROR] {err:#}"));
            }
        }
        Err(err) => coord.apply_delta(Delta::LoadFailed(format!("{err:#}"))),
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = ratatui::Terminal::new(backend)?;

    let mut app = App::new(coord, login);
    let res = run_app(&mut terminal, &mut app, rx);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        eprintln!("error: {err}");
    }
    Ok(())
}

fn parse_login_args() -> Option<Login> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let value = |flag: &str| -> Option<String> {
        let prefix = format!("{flag}=");
        for (idx, arg) in args.iter().enumerate() {
            if let Some(v) = arg.strip_prefix(&prefix) {
                return Some(v.trim().to_string());
            }
            if arg == flag {
                return args.get(idx + 1).map(|v| v.trim().to_string());
            }
        }
        None
    };
    if let Some(identifier) = value("--coach") {
        return Some(Login::Coach {
            identifier,
            password: value("--password").unwrap_or_default(),
        });
    }
    value("--parent").map(|name| Login::Parent {
        name,
        code: value("--code").unwrap_or_default(),
    })
}

fn run_app<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: mpsc::Receiver<Delta>,
) -> io::Result<()> {
    let tick_rate = Duration::from_millis(250);
    let mut last_tick = Instant::now();

    loop {
        app.coord.drain(&rx);
        app.try_login();
        if app.alert.is_none() {
            app.alert = app.coord.state.take_alert();
        }
        let roster_len = app.roster().len();
        if app.selected >= roster_len {
            app.selected = roster_len.saturating_sub(1);
        }

        terminal.draw(|f| ui(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or(Duration::ZERO);
        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            app.on_key(key);
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

fn ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(2),
            Constraint::Min(1),
            Constraint::Length(4),
        ])
        .split(frame.size());

    let header = Paragraph::new(header_text(app)).block(Block::default().borders(Borders::BOTTOM));
    frame.render_widget(header, chunks[0]);

    match &app.state().status {
        LoadStatus::Loading => {
            frame.render_widget(Paragraph::new("Loading academy data..."), chunks[1]);
        }
        LoadStatus::NotConfigured(reason) => {
            let text = format!(
                "The data store is not configured.\n\n{reason}\n\n\
                 Set SUPABASE_URL and SUPABASE_ANON_KEY, or PORTAL_STORE=sqlite."
            );
            frame.render_widget(
                Paragraph::new(text).style(Style::default().fg(Color::Red)),
                chunks[1],
            );
        }
        LoadStatus::Ready if app.state().session.is_none() => {
            frame.render_widget(
                Paragraph::new(
                    "Not signed in. Press l to sign in as a coach or p as a parent.\n\
                     You can also start with --coach <email> --password <pw> \
                     or --parent <player name> --code <access code>.",
                )
                .style(Style::default().fg(Color::DarkGray)),
                chunks[1],
            );
        }
        LoadStatus::Ready => match app.screen {
            Screen::Roster => render_roster(frame, chunks[1], app),
            Screen::Draft => render_draft(frame, chunks[1], app),
            Screen::Reports => render_reports(frame, chunks[1], app),
        },
    }

    let footer = Paragraph::new(footer_text(app)).block(Block::default().borders(Borders::TOP));
    frame.render_widget(footer, chunks[2]);

    if let Some(alert) = &app.alert {
        render_alert(frame, frame.size(), alert);
    } else if let Some(prompt) = &app.prompt {
        render_prompt(frame, frame.size(), prompt);
    } else if app.help_overlay {
        render_help_overlay(frame, frame.size());
    }
}

fn header_text(app: &App) -> String {
    let state = app.state();
    let who = match &state.session {
        Some(Session::Coach { .. }) => state
            .current_coach()
            .map(|c| format!("Coach: {}", c.name))
            .unwrap_or_default(),
        Some(Session::Parent { player_id }) => state
            .player(player_id)
            .map(|p| format!("Parent of {}", p.name))
            .unwrap_or_default(),
        None => "Signed out".to_string(),
    };
    let sync = if state.has_pending_writes() {
        "saving..."
    } else if state.last_synced.is_some() {
        "synced"
    } else {
        "offline"
    };
    format!("ACADEMY PORTAL | {who} | {sync}")
}

fn footer_text(app: &App) -> String {
    let keys = match (app.screen, &app.state().session) {
        (_, None) => "l Coach sign-in | p Parent sign-in | R Refetch | ? Help | q Quit",
        (Screen::Roster, _) => {
            "j/k Move | Enter Draft | r Reports | a Add | e Edit | x Delete | ? Help | q Quit"
        }
        (Screen::Draft, _) => {
            "h/l Skill | n Notes | a/c/x/v Scores | s Strength | t Target | g Generate | p Publish"
        }
        (Screen::Reports, Some(Session::Parent { .. })) => "a Ask the coach | o Sign out | q Quit",
        (Screen::Reports, _) => "b Back | R Refetch | ? Help | q Quit",
    };
    format!("{keys}\n{}", console_text(app.state()))
}

fn console_text(state: &PortalState) -> String {
    if state.logs.is_empty() {
        return "No activity yet".to_string();
    }
    state
        .logs
        .iter()
        .rev()
        .take(2)
        .cloned()
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_roster(frame: &mut Frame, area: Rect, app: &App) {
    let roster = app.roster();
    if roster.is_empty() {
        frame.render_widget(
            Paragraph::new("No players assigned to you")
                .style(Style::default().fg(Color::DarkGray)),
            area,
        );
        return;
    }

    let state = app.state();
    let visible = area.height as usize;
    let (start, end) = visible_range(app.selected, roster.len(), visible);
    let lines: Vec<Line> = (start..end)
        .map(|idx| {
            let p = roster[idx];
            let team = p.team_id.as_deref().unwrap_or("-");
            let rating = p
                .latest_report()
                .map(|r| format!("{:.1}", r.overall_rating))
                .unwrap_or_else(|| "--".to_string());
            let team_avg = p
                .team_id
                .as_deref()
                .and_then(|t| team_rating(&state.players, t))
                .map(|r| format!("{r:.1}"))
                .unwrap_or_else(|| "--".to_string());
            let marker = if state.drafts.has_draft(&p.id) { "*" } else { " " };
            let text = format!(
                "{marker} {:<24} {:<14} {:<12} {:>4}  team {:>4}  reports {}",
                p.name,
                team,
                p.position,
                rating,
                team_avg,
                p.report_cards.len()
            );
            let style = if idx == app.selected {
                Style::default().fg(Color::White).bg(Color::DarkGray)
            } else {
                Style::default()
            };
            Line::styled(text, style)
        })
        .collect();
    frame.render_widget(Paragraph::new(lines), area);
}

fn render_draft(frame: &mut Frame, area: Rect, app: &App) {
    let state = app.state();
    let Some(draft) = state.drafts.active() else {
        frame.render_widget(Paragraph::new("No player selected"), area);
        return;
    };
    let player_id = state.drafts.active_id().unwrap_or_default();
    let name = state.player(player_id).map(|p| p.name.as_str()).unwrap_or("?");

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(area);

    let mut lines = Vec::new();
    let mut cursor = 0usize;
    for group in STAT_GROUPS {
        lines.push(Line::styled(
            group.label().to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        for skill in group.skills() {
            let value = draft.stat(skill).unwrap_or(0);
            let text = format!("  {:<22} {}", skill, "*".repeat(value as usize));
            let style = if cursor == app.skill_cursor {
                Style::default().fg(Color::White).bg(Color::DarkGray)
            } else {
                Style::default()
            };
            lines.push(Line::styled(text, style));
            cursor += 1;
        }
    }
    let skills = Paragraph::new(lines).block(
        Block::default()
            .title(format!("Draft: {name}"))
            .borders(Borders::ALL),
    );
    frame.render_widget(skills, columns[0]);

    let generating = app.coord.is_generating(player_id);
    let author = draft
        .author_coach_id
        .as_deref()
        .and_then(|id| state.coach(id))
        .map(|c| c.name.as_str())
        .unwrap_or("-");
    let side = Paragraph::new(draft_summary_text(draft, author, generating))
        .wrap(ratatui::widgets::Wrap { trim: false })
        .block(Block::default().title("Feedback").borders(Borders::ALL));
    frame.render_widget(side, columns[1]);
}

fn draft_summary_text(draft: &Draft, author: &str, generating: bool) -> String {
    let or_dash = |text: &str| if text.is_empty() { "-".to_string() } else { text.to_string() };
    let mut out = vec![
        format!("{} | {} | author {author}", draft.season, draft.quarter),
        format!(
            "Attendance {}/5  Commitment {}/5  ({})",
            draft.attendance.attendance_score,
            draft.attendance.commitment_score,
            or_dash(&draft.attendance.note)
        ),
        format!(
            "Application {}/5  Behaviour {}/5  ({})",
            draft.ratings.application_score,
            draft.ratings.behaviour_score,
            or_dash(&draft.ratings.coach_comment)
        ),
        format!("Notes: {}", or_dash(&draft.coach_notes)),
        format!("Strengths: {}", or_dash(&draft.manual_strengths.join(", "))),
    ];
    for target in &draft.targets {
        let mark = if target.achieved { "x" } else { " " };
        out.push(format!("[{mark}] {}", target.description));
    }
    out.push(format!("Footer: {}", or_dash(&draft.coach_footer_note)));
    out.push(String::new());
    match (&draft.narrative, generating) {
        (_, true) => out.push("Generating feedback...".to_string()),
        (Some(n), false) => {
            out.push(n.summary.clone());
            out.push(String::new());
            out.push(format!("Key area: {}", n.improvements.key_area));
            out.push(format!("Build on: {}", n.improvements.build_on_area));
        }
        (None, false) => out.push("No feedback yet. Press g to generate.".to_string()),
    }
    out.join("\n")
}

fn render_reports(frame: &mut Frame, area: Rect, app: &App) {
    let state = app.state();
    let player_id = match &state.session {
        Some(Session::Parent { player_id }) => Some(player_id.clone()),
        _ => app.selected_player_id(),
    };
    let Some(player) = player_id.as_deref().and_then(|id| state.player(id)) else {
        frame.render_widget(Paragraph::new("No player selected"), area);
        return;
    };

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let trend = category_trend(player);
    let mut chart = BarChart::default()
        .block(
            Block::default()
                .title(format!("{} - progress", player.name))
                .borders(Borders::ALL),
        )
        .bar_width(3)
        .bar_gap(1)
        .group_gap(3)
        .max(50);
    let colors = [Color::Green, Color::Cyan, Color::Yellow, Color::Magenta];
    for point in &trend {
        let bars: Vec<Bar> = point
            .averages
            .iter()
            .zip(colors)
            .map(|((_, avg), color)| {
                Bar::default()
                    .value((avg * 10.0).round() as u64)
                    .text_value(format!("{avg:.1}"))
                    .style(Style::default().fg(color))
            })
            .collect();
        chart = chart.data(
            BarGroup::default()
                .label(Line::from(point.label.clone()))
                .bars(&bars),
        );
    }
    frame.render_widget(chart, rows[0]);

    let mut lines = Vec::new();
    for report in sorted_reports(player) {
        lines.push(Line::styled(
            format!(
                "{} {} | overall {:.1} | targets {}/{} | by {}",
                report.season,
                report.quarter,
                report.overall_rating,
                report.targets_achieved(),
                report.targets.len(),
                report.author_coach_name.as_deref().unwrap_or("-")
            ),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        lines.push(Line::from(format!("  {}", report.final_summary)));
        lines.push(Line::from(format!("  Strengths: {}", report.strengths.join(", "))));
    }
    if lines.is_empty() {
        lines.push(Line::from("No report cards published yet"));
    }
    let history = Paragraph::new(lines)
        .wrap(ratatui::widgets::Wrap { trim: true })
        .block(Block::default().title("Reports").borders(Borders::ALL));
    frame.render_widget(history, rows[1]);
}

fn visible_range(selected: usize, total: usize, visible: usize) -> (usize, usize) {
    if total == 0 {
        return (0, 0);
    }
    if total <= visible {
        return (0, total);
    }

    let mut start = selected.saturating_sub(visible / 2);
    if start + visible > total {
        start = total - visible;
    }
    (start, start + visible)
}

fn render_alert(frame: &mut Frame, area: Rect, message: &str) {
    let popup_area = centered_rect(50, 20, area);
    frame.render_widget(Clear, popup_area);
    let alert = Paragraph::new(format!("{message}\n\n(press any key)"))
        .wrap(ratatui::widgets::Wrap { trim: true })
        .block(Block::default().title("Notice").borders(Borders::ALL));
    frame.render_widget(alert, popup_area);
}

fn render_prompt(frame: &mut Frame, area: Rect, prompt: &Prompt) {
    let popup_area = centered_rect(70, 20, area);
    frame.render_widget(Clear, popup_area);
    let masked;
    let shown = if matches!(prompt.kind, PromptKind::CoachLogin | PromptKind::ParentLogin) {
        masked = mask_secret(&prompt.buffer);
        masked.as_str()
    } else {
        prompt.buffer.as_str()
    };
    let input = Paragraph::new(format!("{shown}_\n\nEnter to save, Esc to cancel"))
        .wrap(ratatui::widgets::Wrap { trim: false })
        .block(Block::default().title(prompt.kind.title()).borders(Borders::ALL));
    frame.render_widget(input, popup_area);
}

// Hides everything after the last space, which is where the password or code goes.
fn mask_secret(text: &str) -> String {
    match text.rsplit_once(' ') {
        Some((who, secret)) => format!("{who} {}", "*".repeat(secret.chars().count())),
        None => text.to_string(),
    }
}

fn render_help_overlay(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(70, 90, area);
    frame.render_widget(Clear, popup_area);

    let text = [
        "Academy Portal - Help",
        "",
        "Global:",
        "  R            Refetch everything",
        "  ?            Toggle help",
        "  q            Quit",
        "",
        "Roster:",
        "  j/k or ↑/↓   Move",
        "  Enter / d    Open draft",
        "  r            Report history",
        "  a / e        Add / edit player",
        "  i            Set player photo from a file",
        "  x            Delete player",
        "  m            Edit your profile",
        "  t / X        Add teams / delete team (admin)",
        "  c / L        Add coach / set logo (admin)",
        "  o            Sign out",
        "",
        "Draft:",
        "  j/k          Pick skill",
        "  h/l or -/+   Adjust rating",
        "  a c x v      Cycle attendance, commitment, application, behaviour",
        "  n            Coach notes",
        "  A / C        Attendance note / ratings comment",
        "  s / S        Add / remove strength",
        "  t / T / Bksp Add / toggle / remove target",
        "  f            Footer note",
        "  e / E        Season / term",
        "  w            Change author",
        "  g            Generate feedback",
        "  p            Publish report card",
        "  b / Esc      Back (draft is kept)",
        "",
        "Parents:",
        "  a            Ask the coach about the latest report",
    ]
    .join("\n");

    let help = Paragraph::new(text)
        .block(Block::default().title("Help").borders(Borders::ALL))
        .style(Style::default());
    frame.render_widget(help, popup_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    let horizontal = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1]);

    horizontal[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_split_at_last_space() {
        assert_eq!(
            split_credentials("Luke Skehill 1234"),
            Some(("Luke Skehill", "1234"))
        );
        assert_eq!(
            split_credentials(" admin@example.com  admin "),
            Some(("admin@example.com", "admin"))
        );
        assert_eq!(split_credentials("admin"), None);
        assert_eq!(mask_secret("coach_admin admin"), "coach_admin *****");
    }

    #[test]
    fn scores_cycle_through_one_to_five() {
        assert_eq!(cycle_score(1), 2);
        assert_eq!(cycle_score(4), 5);
        assert_eq!(cycle_score(5), 1);
    }

    #[test]
    fn author_cycles_through_coaches() {
        let ids = vec!["a".to_string(), "b".to_string()];
        assert_eq!(next_author(&ids, Some("a")).as_deref(), Some("b"));
        assert_eq!(next_author(&ids, Some("b")).as_deref(), Some("a"));
        assert_eq!(next_author(&ids, Some("gone")).as_deref(), Some("a"));
        assert_eq!(next_author(&[], None), None);
    }

    #[test]
    fn new_player_fields_parse() {
        let p = parse_new_player("New Kid, U10 Reds, Winger, 9").unwrap();
        assert_eq!(p.name, "New Kid");
        assert_eq!(p.team_id.as_deref(), Some("U10 Reds"));
        assert_eq!(p.position, "Winger");
        assert_eq!(p.jersey_number, Some(9));
        assert_eq!(p.branch, Branch::Academy);

        let p = parse_new_player("Session Sam, , , , coaching").unwrap();
        assert_eq!(p.branch, Branch::Coaching);
        assert_eq!(p.team_id, None);
        assert_eq!(p.jersey_number, None);

        assert!(parse_new_player(" , U10").is_err());
        assert!(parse_new_player("Kid, U10, Wing, seven").is_err());
        assert!(parse_new_player("Kid, U10, Wing, 7, rugby").is_err());
    }

    fn signed_in_app() -> (App, mpsc::Receiver<coach_portal::state::SyncCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let mut coord = SyncCoordinator::new(cmd_tx);
        coord.apply_delta(Delta::Loaded(coach_portal::state::Snapshot {
            players: Some(coach_portal::fallback::fallback_players()),
            coaches: Some(coach_portal::fallback::fallback_coaches()),
            teams: Some(coach_portal::fallback::fallback_teams()),
            logo: None,
            write_seq: 0,
            warnings: Vec::new(),
        }));
        let app = App::new(
            coord,
            Some(Login::Coach {
                identifier: "coach_admin".to_string(),
                password: "admin".to_string(),
            }),
        );
        (app, cmd_rx)
    }

    fn press(app: &mut App, code: KeyCode) {
        app.on_key(KeyEvent::from(code));
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
        press(app, KeyCode::Enter);
    }

    #[test]
    fn coach_notes_reach_the_draft_through_the_prompt() {
        let (mut app, _cmd_rx) = signed_in_app();
        app.try_login();
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.screen, Screen::Draft);

        press(&mut app, KeyCode::Char('n'));
        type_text(&mut app, "Quick feet, shy on the ball");
        press(&mut app, KeyCode::Char('a'));
        press(&mut app, KeyCode::Char('t'));
        type_text(&mut app, "Use the weaker foot");
        press(&mut app, KeyCode::Char('T'));

        let draft = app.state().drafts.get("p1").unwrap();
        assert_eq!(draft.coach_notes, "Quick feet, shy on the ball");
        assert_eq!(draft.attendance.attendance_score, 5);
        assert_eq!(draft.targets.len(), 1);
        assert!(draft.targets[0].achieved);
        assert!(app.prompt.is_none());
    }

    #[test]
    fn admin_can_add_teams_and_players_from_the_roster() {
        let (mut app, cmd_rx) = signed_in_app();
        app.try_login();
        press(&mut app, KeyCode::Char('t'));
        type_text(&mut app, "U11 / Reds, Blues");
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "New Kid, U11 Reds, Winger, 9");

        let state = app.state();
        assert!(state.teams.iter().any(|t| t.id == "U11 Blues"));
        assert!(state.players.iter().any(|p| p.name == "New Kid"));
        assert_eq!(cmd_rx.try_iter().count(), 3);
    }

    #[test]
    fn escape_cancels_a_prompt() {
        let (mut app, _cmd_rx) = signed_in_app();
        app.try_login();
        press(&mut app, KeyCode::Char('a'));
        press(&mut app, KeyCode::Char('q'));
        press(&mut app, KeyCode::Esc);
        assert!(app.prompt.is_none());
        assert!(!app.should_quit);
        assert_eq!(app.state().players.len(), 3);
    }
}
