use std::cmp;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use mapty_core::{Coordinates, WorkoutFields, WorkoutKind};
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::app::Theme;

const MAX_INPUT_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Kind,
    Distance,
    Duration,
    Metric,
}

impl FormField {
    const ORDER: [FormField; 4] = [
        FormField::Kind,
        FormField::Distance,
        FormField::Duration,
        FormField::Metric,
    ];

    fn index(self) -> usize {
        Self::ORDER
            .iter()
            .position(|field| *field == self)
            .unwrap_or(0)
    }

    fn step(self, delta: isize) -> Self {
        let len = Self::ORDER.len() as isize;
        let next = (self.index() as isize + delta).rem_euclid(len);
        Self::ORDER[next as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormAction {
    None,
    Submit,
    Cancel,
}

#[derive(Debug, Clone, Default)]
struct TextInput {
    value: String,
    cursor: usize,
}

impl TextInput {
    fn move_cursor(&mut self, delta: isize) {
        let len = self.value.len() as isize;
        self.cursor = (self.cursor as isize + delta).clamp(0, len) as usize;
    }

    fn move_home(&mut self) {
        self.cursor = 0;
    }

    fn move_end(&mut self) {
        self.cursor = self.value.len();
    }

    fn insert(&mut self, ch: char) {
        if self.value.len() >= MAX_INPUT_LEN {
            return;
        }
        if ch.is_ascii() && !ch.is_ascii_control() {
            self.value.insert(self.cursor, ch);
            self.cursor += 1;
        }
    }

    fn backspace(&mut self) {
        if self.cursor > 0 && self.cursor <= self.value.len() {
            self.cursor -= 1;
            self.value.remove(self.cursor);
        }
    }

    fn delete(&mut self) {
        if self.cursor < self.value.len() {
            self.value.remove(self.cursor);
        }
    }

    fn clear(&mut self) {
        self.value.clear();
        self.cursor = 0;
    }
}

/// Modal collecting a new workout for a picked map position.
#[derive(Debug, Clone)]
pub struct WorkoutForm {
    coordinates: Coordinates,
    kind: WorkoutKind,
    focus: FormField,
    distance: TextInput,
    duration: TextInput,
    metric: TextInput,
    error: Option<String>,
}

impl WorkoutForm {
    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            coordinates,
            kind: WorkoutKind::Running,
            focus: FormField::Distance,
            distance: TextInput::default(),
            duration: TextInput::default(),
            metric: TextInput::default(),
            error: None,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    pub fn kind(&self) -> WorkoutKind {
        self.kind
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_error(&mut self, message: String) {
        self.error = Some(message);
    }

    pub fn fields(&self) -> WorkoutFields {
        WorkoutFields::parse(
            &self.distance.value,
            &self.duration.value,
            &self.metric.value,
        )
    }

    /// Switch between running and cycling; the cadence/elevation input is
    /// swapped, so its contents are dropped.
    pub fn toggle_kind(&mut self) {
        self.kind = self.kind.toggled();
        self.metric.clear();
    }

    fn input_mut(&mut self, field: FormField) -> Option<&mut TextInput> {
        match field {
            FormField::Kind => None,
            FormField::Distance => Some(&mut self.distance),
            FormField::Duration => Some(&mut self.duration),
            FormField::Metric => Some(&mut self.metric),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> FormAction {
        match key.code {
            KeyCode::Esc => return FormAction::Cancel,
            KeyCode::Enter => return FormAction::Submit,
            KeyCode::Tab | KeyCode::Down => self.focus = self.focus.step(1),
            KeyCode::BackTab | KeyCode::Up => self.focus = self.focus.step(-1),
            _ if self.focus == FormField::Kind => match key.code {
                KeyCode::Left | KeyCode::Right | KeyCode::Char(' ') => self.toggle_kind(),
                KeyCode::Char('r') if self.kind != WorkoutKind::Running => self.toggle_kind(),
                KeyCode::Char('c') if self.kind != WorkoutKind::Cycling => self.toggle_kind(),
                _ => {}
            },
            code => {
                let focus = self.focus;
                if let Some(input) = self.input_mut(focus) {
                    match code {
                        KeyCode::Left => input.move_cursor(-1),
                        KeyCode::Right => input.move_cursor(1),
                        KeyCode::Home => input.move_home(),
                        KeyCode::End => input.move_end(),
                        KeyCode::Backspace => input.backspace(),
                        KeyCode::Delete => input.delete(),
                        KeyCode::Char(ch)
                            if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT =>
                        {
                            input.insert(ch)
                        }
                        _ => {}
                    }
                }
            }
        }
        FormAction::None
    }

    pub fn render(&self, frame: &mut Frame, theme: &Theme) {
        let frame_area = frame.size();
        let width = cmp::max(cmp::min(56_u16, frame_area.width.saturating_sub(4)), 30_u16);
        let height = 11_u16.min(frame_area.height.saturating_sub(2)).max(7_u16);
        let x = frame_area.x + frame_area.width.saturating_sub(width) / 2;
        let y = frame_area.y + frame_area.height.saturating_sub(height) / 2;
        let area = Rect::new(x, y, width, height).intersection(frame_area);

        frame.render_widget(Clear, area);

        let metric_label = match self.kind {
            WorkoutKind::Running => "Cadence (spm)",
            WorkoutKind::Cycling => "Elev gain (m)",
        };
        let rows = [
            (FormField::Kind, "Type", self.kind.label().to_string()),
            (FormField::Distance, "Distance (km)", self.distance.value.clone()),
            (FormField::Duration, "Duration (min)", self.duration.value.clone()),
            (FormField::Metric, metric_label, self.metric.value.clone()),
        ];

        let mut lines: Vec<Line> = rows
            .into_iter()
            .map(|(field, label, value)| {
                let focused = field == self.focus;
                let marker = if focused {
                    Span::styled("▶ ", Style::default().fg(theme.accent))
                } else {
                    Span::raw("  ")
                };
                let label_style = if focused {
                    Style::default().add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(theme.muted)
                };
                let value = if field == FormField::Kind {
                    format!("◀ {value} ▶")
                } else {
                    value
                };
                Line::from(vec![
                    marker,
                    Span::styled(format!("{label:<15}"), label_style),
                    Span::raw(value),
                ])
            })
            .collect();

        lines.push(Line::from(""));
        match &self.error {
            Some(message) => lines.push(Line::from(Span::styled(
                message.clone(),
                Style::default().fg(theme.danger),
            ))),
            None => lines.push(Line::from(vec![
                Span::styled("Enter", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" save  "),
                Span::styled("Tab", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" next field  "),
                Span::styled("Esc", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(" cancel"),
            ])),
        }

        let title = format!("New workout @ {}", self.coordinates);
        let paragraph = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);

        let focus_row = self.focus.index() as u16;
        let cursor_col = match self.focus {
            FormField::Kind => 2,
            FormField::Distance => self.distance.cursor,
            FormField::Duration => self.duration.cursor,
            FormField::Metric => self.metric.cursor,
        } as u16;
        let cursor_x = (area.x + 1 + 2 + 15 + cursor_col).min(area.right().saturating_sub(2));
        let cursor_y = (area.y + 1 + focus_row).min(area.bottom().saturating_sub(2));
        frame.set_cursor(cursor_x, cursor_y);
    }
}
