use std::{io, thread, time::Duration};

use anyhow::{Context, Result};
use chrono::Local;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use mapty_core::{
    config::AppConfig, Coordinates, KeyValueStore, Locator, StoreError, Workout, WorkoutStore,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    form::{FormAction, WorkoutForm},
    map::{MapView, Marker},
};

const TICK_RATE: Duration = Duration::from_millis(250);
/// Shown until a position is known.
const WORLD_CENTER: Coordinates = Coordinates::new(20.0, 0.0);

#[derive(Debug, Clone)]
pub struct Theme {
    pub primary_fg: Color,
    pub accent: Color,
    pub muted: Color,
    pub selection_bg: Color,
    pub warning: Color,
    pub danger: Color,
    pub running: Color,
    pub cycling: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_fg: Color::White,
            accent: Color::Cyan,
            muted: Color::DarkGray,
            selection_bg: Color::DarkGray,
            warning: Color::Yellow,
            danger: Color::Red,
            running: Color::Rgb(0x00, 0xc4, 0x6a),
            cycling: Color::Rgb(0xff, 0xb5, 0x45),
        }
    }
}

impl Theme {
    fn workout_color(&self, workout: &Workout) -> Color {
        match workout {
            Workout::Running(_) => self.running,
            Workout::Cycling(_) => self.cycling,
            Workout::Unknown(_) => self.muted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Map,
    List,
}

enum AppEvent {
    Input(Event),
    Tick,
    Located(Result<Coordinates>),
}

/// Terminal front end driving a [`WorkoutStore`].
pub struct MaptyApp<S> {
    store: WorkoutStore<S>,
    config: AppConfig,
    map: MapView,
    home: Option<Coordinates>,
    focus: Focus,
    list_state: ListState,
    form: Option<WorkoutForm>,
    confirm_reset: bool,
    status: String,
    theme: Theme,
    should_quit: bool,
    locator: Option<Locator>,
}

impl<S: KeyValueStore> MaptyApp<S> {
    pub fn new(store: WorkoutStore<S>, config: AppConfig) -> Self {
        let map = MapView::new(WORLD_CENTER, config.map.initial_zoom);
        Self {
            store,
            config,
            map,
            home: None,
            focus: Focus::Map,
            list_state: ListState::default(),
            form: None,
            confirm_reset: false,
            status: "Ready".to_string(),
            theme: Theme::default(),
            should_quit: false,
            locator: None,
        }
    }

    pub fn attach_locator(&mut self, locator: Locator) {
        self.locator = Some(locator);
    }

    pub async fn run(&mut self) -> Result<()> {
        self.load_workouts();

        let mut stdout = io::stdout();
        enable_raw_mode().context("failed to enter raw mode")?;
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).context("failed to create terminal")?;
        terminal.hide_cursor()?;
        terminal.clear()?;

        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(128);
        spawn_input_thread(event_tx.clone());
        if let Some(locator) = self.locator.take() {
            spawn_locator(locator, event_tx);
        } else {
            drop(event_tx);
        }

        loop {
            terminal.draw(|frame| self.draw(frame))?;
            if self.should_quit {
                break;
            }
            match event_rx.recv().await {
                Some(event) => self.process_app_event(event),
                None => break,
            }
            if self.should_quit {
                break;
            }
        }

        restore_terminal(&mut terminal)?;
        Ok(())
    }

    fn load_workouts(&mut self) {
        match self.store.load_from_persistence() {
            Ok(report) if report.unrecognized > 0 => self.set_status(format!(
                "Loaded {} workouts ({} unrecognised entries kept)",
                report.restored, report.unrecognized
            )),
            Ok(report) => self.set_status(format!("Loaded {} workouts", report.restored)),
            Err(err) => {
                error!(%err, "failed to load stored workouts");
                self.set_status(format!("Could not load stored workouts: {err}"));
            }
        }
        self.clamp_selection();
    }

    fn process_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Input(event) => {
                if let Err(err) = self.handle_input(event) {
                    self.set_status(format!("Error: {err}"));
                }
            }
            AppEvent::Tick => {}
            AppEvent::Located(result) => self.handle_located(result),
        }
    }

    fn handle_located(&mut self, result: Result<Coordinates>) {
        match result {
            Ok(position) => {
                info!(%position, "position acquired");
                self.home = Some(position);
                self.map.set_view(position, self.config.map.zoom);
                self.set_status(format!("Centered on your position ({position})"));
            }
            Err(err) => {
                warn!(?err, "position unavailable");
                self.set_status(format!(
                    "Could not get your position ({err:#}); pick a spot manually"
                ));
            }
        }
    }

    fn handle_input(&mut self, event: Event) -> Result<()> {
        let Event::Key(key) = event else {
            return Ok(());
        };
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }

        if self.confirm_reset {
            self.confirm_reset = false;
            if matches!(key.code, KeyCode::Char('y') | KeyCode::Char('Y')) {
                self.reset_all();
            } else {
                self.set_status("Reset cancelled".to_string());
            }
            return Ok(());
        }

        if let Some(form) = self.form.as_mut() {
            match form.handle_key(key) {
                FormAction::Submit => self.submit_form(),
                FormAction::Cancel => {
                    self.form = None;
                    self.set_status("Workout discarded".to_string());
                }
                FormAction::None => {}
            }
            return Ok(());
        }

        if self.handle_global_key(&key) {
            return Ok(());
        }
        match self.focus {
            Focus::Map => self.handle_map_key(key),
            Focus::List => self.handle_list_key(key),
        }
        Ok(())
    }

    fn handle_global_key(&mut self, key: &KeyEvent) -> bool {
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            self.should_quit = true;
            return true;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Tab | KeyCode::BackTab => {
                self.focus = match self.focus {
                    Focus::Map => Focus::List,
                    Focus::List => Focus::Map,
                };
            }
            KeyCode::Char('R') => {
                self.confirm_reset = true;
                self.set_status("Delete ALL workouts? (y/n)".to_string());
            }
            _ => return false,
        }
        true
    }

    fn handle_map_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.map.move_cursor(1, 0),
            KeyCode::Down | KeyCode::Char('j') => self.map.move_cursor(-1, 0),
            KeyCode::Left | KeyCode::Char('h') => self.map.move_cursor(0, -1),
            KeyCode::Right | KeyCode::Char('l') => self.map.move_cursor(0, 1),
            KeyCode::Char('+') | KeyCode::Char('=') => self.map.zoom_by(1),
            KeyCode::Char('-') => self.map.zoom_by(-1),
            KeyCode::Char('c') => match self.home {
                Some(home) => self.map.set_view(home, self.config.map.zoom),
                None => self.set_status("Position not known yet".to_string()),
            },
            KeyCode::Enter | KeyCode::Char('n') => self.open_form(self.map.cursor()),
            _ => {}
        }
    }

    fn handle_list_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_selection(1),
            KeyCode::Home | KeyCode::Char('g') => self.list_state.select(Some(0)),
            KeyCode::End | KeyCode::Char('G') => {
                self.list_state.select(self.store.len().checked_sub(1));
            }
            KeyCode::Enter => self.focus_selected(),
            _ => {}
        }
        self.clamp_selection();
    }

    fn open_form(&mut self, position: Coordinates) {
        debug!(%position, "opening workout form");
        self.form = Some(WorkoutForm::new(position));
        self.set_status(format!("New workout at {position}"));
    }

    fn submit_form(&mut self) {
        let Some(form) = self.form.as_mut() else {
            return;
        };
        let outcome = self
            .store
            .add_workout(form.kind(), form.fields(), form.coordinates());
        match outcome {
            Ok(added) => {
                let description = added.workout.description().to_string();
                let warning = added.warning.map(|err| err.to_string());
                self.form = None;
                self.list_state.select(self.store.len().checked_sub(1));
                match warning {
                    Some(warning) => self.set_status(format!(
                        "{description} added, but not saved: {warning}"
                    )),
                    None => self.set_status(format!("{description} added")),
                }
            }
            Err(StoreError::Invalid(err)) => {
                form.set_error(format!("Inputs have to be positive numbers: {err}"));
            }
            Err(err) => {
                error!(%err, "failed to add workout");
                self.form = None;
                self.set_status(format!("Could not add workout: {err}"));
            }
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.store.len();
        if len == 0 {
            self.list_state.select(None);
            return;
        }
        let current = self.list_state.selected().unwrap_or(0) as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.list_state.select(Some(next as usize));
    }

    fn clamp_selection(&mut self) {
        let len = self.store.len();
        match self.list_state.selected() {
            _ if len == 0 => self.list_state.select(None),
            Some(index) if index >= len => self.list_state.select(Some(len - 1)),
            None => self.list_state.select(Some(0)),
            Some(_) => {}
        }
    }

    fn focus_selected(&mut self) {
        let Some(index) = self.list_state.selected() else {
            return;
        };
        let Some(id) = self
            .store
            .workouts()
            .get(index)
            .and_then(Workout::id)
            .map(str::to_string)
        else {
            self.set_status("Selected entry has no identifier".to_string());
            return;
        };

        let zoom = self.config.map.zoom;
        let target = self
            .store
            .select(&id)
            .map(|workout| (workout.coordinates(), workout.description().to_string()));
        match target {
            Some((Some(position), description)) => {
                self.map.set_view(position, zoom);
                self.set_status(format!("{description} at {position}"));
            }
            Some((None, description)) => {
                self.set_status(format!("{description} has no usable position"));
            }
            None => self.set_status(format!("Workout {id} not found")),
        }
    }

    fn reset_all(&mut self) {
        if let Err(err) = self.store.clear_all() {
            error!(%err, "reset failed");
            self.set_status(format!("Reset failed: {err}"));
            return;
        }
        self.form = None;
        self.list_state.select(None);
        self.focus = Focus::Map;
        match self.home {
            Some(home) => self.map.set_view(home, self.config.map.zoom),
            None => self.map.set_view(WORLD_CENTER, self.config.map.initial_zoom),
        }
        self.load_workouts();
        self.set_status("All workouts deleted".to_string());
    }

    fn set_status(&mut self, message: String) {
        self.status = message;
    }

    fn draw(&mut self, frame: &mut Frame) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(8), Constraint::Length(3)])
            .split(frame.size());
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(44), Constraint::Min(20)])
            .split(rows[0]);

        self.render_workout_list(frame, body[0]);
        self.render_map(frame, body[1]);
        self.render_status(frame, rows[1]);

        if let Some(form) = &self.form {
            form.render(frame, &self.theme);
        }
        if self.confirm_reset {
            self.render_confirm(frame);
        }
    }

    fn render_workout_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.store.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "No workouts yet. Pick a spot on the map and press Enter.",
                Style::default().fg(self.theme.muted),
            )))]
        } else {
            self.store
                .iter()
                .map(|workout| {
                    let color = self.theme.workout_color(workout);
                    ListItem::new(vec![
                        Line::from(Span::styled(
                            workout.description().to_string(),
                            Style::default().fg(color).add_modifier(Modifier::BOLD),
                        )),
                        Line::from(Span::styled(
                            workout_summary(workout),
                            Style::default().fg(self.theme.primary_fg),
                        )),
                    ])
                })
                .collect()
        };

        let border_style = if self.focus == Focus::List {
            Style::default().fg(self.theme.accent)
        } else {
            Style::default().fg(self.theme.muted)
        };
        let title = format!(" Workouts ({}) ", self.store.len());
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .title(title),
            )
            .highlight_symbol("▶ ")
            .highlight_style(Style::default().bg(self.theme.selection_bg));
        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn render_map(&self, frame: &mut Frame, area: Rect) {
        let selected = self.list_state.selected();
        let markers: Vec<Marker> = self
            .store
            .iter()
            .enumerate()
            .filter_map(|(index, workout)| {
                let position = workout.coordinates()?;
                Some(Marker {
                    position,
                    label: workout.description().to_string(),
                    color: self.theme.workout_color(workout),
                    selected: selected == Some(index),
                })
            })
            .filter(|marker| self.map.contains(marker.position))
            .collect();
        self.map
            .render(frame, area, &markers, &self.theme, self.focus == Focus::Map);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let help = match (self.form.is_some(), self.focus) {
            (true, _) => "Enter save · Tab next field · Esc cancel",
            (false, Focus::Map) => {
                "←↑↓→ move · +/- zoom · Enter new workout · c home · Tab list · R reset · q quit"
            }
            (false, Focus::List) => "↑↓ choose · Enter show on map · Tab map · R reset · q quit",
        };
        let timestamp = Local::now().format("%H:%M");
        let paragraph = Paragraph::new(vec![
            Line::from(format!("[{timestamp}] {}", self.status)),
            Line::from(Span::styled(help, Style::default().fg(self.theme.muted))),
        ])
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn render_confirm(&self, frame: &mut Frame) {
        let area = centered_rect(44, 5, frame.size());
        frame.render_widget(Clear, area);
        let paragraph = Paragraph::new(vec![
            Line::from(Span::styled(
                format!("Delete all {} workouts?", self.store.len()),
                Style::default()
                    .fg(self.theme.warning)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from("y confirm · any other key cancels"),
        ])
        .block(Block::default().borders(Borders::ALL).title("Reset"))
        .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }
}

/// One-line metrics summary for the list.
fn workout_summary(workout: &Workout) -> String {
    match workout {
        Workout::Running(run) => format!(
            "🏃 {:.1} km  ⏱ {:.0} min  ⚡ {:.1} min/km  🦶 {:.0} spm",
            run.base().distance_km(),
            run.base().duration_min(),
            run.pace_min_per_km(),
            run.cadence_spm()
        ),
        Workout::Cycling(ride) => format!(
            "🚴 {:.1} km  ⏱ {:.0} min  ⚡ {:.1} km/h  ⛰ {:.0} m",
            ride.base().distance_km(),
            ride.base().duration_min(),
            ride.speed_km_per_h(),
            ride.elevation_gain_m()
        ),
        Workout::Unknown(unknown) => format!(
            "? unrecognised entry (kind: {})",
            unknown.kind_tag().unwrap_or("missing")
        ),
    }
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor()?;
    Ok(())
}

fn spawn_input_thread(sender: mpsc::Sender<AppEvent>) {
    thread::spawn(move || loop {
        match event::poll(TICK_RATE) {
            Ok(true) => match event::read() {
                Ok(evt) => {
                    if sender.blocking_send(AppEvent::Input(evt)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            },
            Ok(false) => {
                if sender.blocking_send(AppEvent::Tick).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
}

fn spawn_locator(locator: Locator, sender: mpsc::Sender<AppEvent>) {
    tokio::spawn(async move {
        let result = locator.locate().await;
        if sender.send(AppEvent::Located(result)).await.is_err() {
            debug!("event loop closed before the position arrived");
        }
    });
}

#[cfg(test)]
mod tests {
    use mapty_core::{MemoryStore, SessionState, WorkoutKind};

    use super::*;

    fn press<S: KeyValueStore>(app: &mut MaptyApp<S>, code: KeyCode) {
        app.handle_input(Event::Key(KeyEvent::new(code, KeyModifiers::NONE)))
            .expect("key handled");
    }

    fn type_text(app: &mut MaptyApp<MemoryStore>, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch));
        }
    }

    fn started_app(medium: MemoryStore) -> MaptyApp<MemoryStore> {
        let mut app = MaptyApp::new(WorkoutStore::new(medium), AppConfig::default());
        app.load_workouts();
        app
    }

    fn add_run(app: &mut MaptyApp<MemoryStore>, distance: &str) {
        press(app, KeyCode::Enter);
        type_text(app, distance);
        press(app, KeyCode::Tab);
        type_text(app, "30");
        press(app, KeyCode::Tab);
        type_text(app, "180");
        press(app, KeyCode::Enter);
    }

    #[test]
    fn form_submission_adds_and_persists() {
        let medium = MemoryStore::new();
        let mut app = started_app(medium.clone());
        app.handle_located(Ok(Coordinates::new(52.5, 4.25)));

        add_run(&mut app, "5");
        assert!(app.form.is_none());
        assert_eq!(app.store.len(), 1);
        assert_eq!(app.list_state.selected(), Some(0));
        assert!(app.status.ends_with("added"));

        let Workout::Running(run) = &app.store.workouts()[0] else {
            panic!("expected a running workout");
        };
        assert_eq!(run.pace_min_per_km(), 6.0);
        assert_eq!(run.base().coordinates(), Coordinates::new(52.5, 4.25));

        let reloaded = started_app(medium);
        assert_eq!(reloaded.store.workouts(), app.store.workouts());
    }

    #[test]
    fn invalid_form_stays_open_with_message() {
        let mut app = started_app(MemoryStore::new());
        add_run(&mut app, "-5");
        let form = app.form.as_ref().expect("form kept open");
        assert!(form.error().is_some_and(|msg| msg.contains("distance")));
        assert!(app.store.is_empty());

        press(&mut app, KeyCode::Esc);
        assert!(app.form.is_none());
        assert!(!app.should_quit);
    }

    #[test]
    fn list_selection_recenters_map_and_counts() {
        let mut app = started_app(MemoryStore::new());
        add_run(&mut app, "5");
        app.map.set_view(Coordinates::new(-30.0, 100.0), 4);

        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.map.cursor(), WORLD_CENTER);
        assert_eq!(app.map.zoom(), app.config.map.zoom);
        let count = app.store.workouts()[0]
            .base()
            .map(|base| base.interaction_count());
        assert_eq!(count, Some(1));
    }

    #[test]
    fn reset_requires_confirmation() {
        let medium = MemoryStore::new();
        let mut app = started_app(medium.clone());
        add_run(&mut app, "5");

        press(&mut app, KeyCode::Char('R'));
        press(&mut app, KeyCode::Char('n'));
        assert_eq!(app.store.len(), 1);

        press(&mut app, KeyCode::Char('R'));
        press(&mut app, KeyCode::Char('y'));
        assert!(app.store.is_empty());
        assert_eq!(app.store.state(), SessionState::Loaded);
        assert!(medium.is_empty());
        assert_eq!(app.status, "All workouts deleted");

        add_run(&mut app, "10");
        assert_eq!(app.store.len(), 1);
    }

    struct UnreadableMedium;

    impl KeyValueStore for UnreadableMedium {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow::anyhow!("permission denied"))
        }

        fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
            Ok(())
        }

        fn remove(&mut self, _key: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unreadable_storage_still_accepts_workouts() {
        let mut app = MaptyApp::new(WorkoutStore::new(UnreadableMedium), AppConfig::default());
        app.load_workouts();
        assert!(app.status.contains("permission denied"));

        let keys = [
            KeyCode::Enter,
            KeyCode::Char('5'),
            KeyCode::Tab,
            KeyCode::Char('3'),
            KeyCode::Char('0'),
            KeyCode::Tab,
            KeyCode::Char('9'),
            KeyCode::Char('0'),
            KeyCode::Enter,
        ];
        for code in keys {
            press(&mut app, code);
        }

        assert!(app.form.is_none());
        assert_eq!(app.store.len(), 1);
        assert!(app.status.contains("not saved"));
    }

    #[test]
    fn failed_location_keeps_world_view() {
        let mut app = started_app(MemoryStore::new());
        app.handle_located(Err(anyhow::anyhow!("permission denied")));
        assert_eq!(app.map.cursor(), WORLD_CENTER);
        assert!(app.status.contains("permission denied"));
        press(&mut app, KeyCode::Char('c'));
        assert_eq!(app.status, "Position not known yet");
    }

    #[test]
    fn summaries_show_variant_metrics() {
        let mut store = WorkoutStore::new(MemoryStore::new());
        store.load_from_persistence().expect("load");
        let run = store
            .add_workout(
                WorkoutKind::Running,
                mapty_core::WorkoutFields::new(5.0, 30.0, 180.0),
                WORLD_CENTER,
            )
            .expect("valid run")
            .workout
            .clone();
        assert_eq!(
            workout_summary(&run),
            "🏃 5.0 km  ⏱ 30 min  ⚡ 6.0 min/km  🦶 180 spm"
        );

        let ride = store
            .add_workout(
                WorkoutKind::Cycling,
                mapty_core::WorkoutFields::new(20.0, 60.0, -5.0),
                WORLD_CENTER,
            )
            .expect("valid ride")
            .workout
            .clone();
        assert_eq!(
            workout_summary(&ride),
            "🚴 20.0 km  ⏱ 60 min  ⚡ 20.0 km/h  ⛰ -5 m"
        );
    }
}
