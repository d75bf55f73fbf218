use mapty_core::Coordinates;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        canvas::{Canvas, Map, MapResolution, Points},
        Block, Borders,
    },
    Frame,
};

use crate::app::Theme;

pub const MAX_ZOOM: u8 = 18;
/// Cursor steps needed to cross the visible area.
const STEPS_PER_VIEW: f64 = 16.0;

/// Point drawn on the map for a workout.
#[derive(Debug, Clone)]
pub struct Marker {
    pub position: Coordinates,
    pub label: String,
    pub color: Color,
    pub selected: bool,
}

/// Visible window of the world map plus the crosshair used to pick a spot.
#[derive(Debug, Clone)]
pub struct MapView {
    center: Coordinates,
    cursor: Coordinates,
    zoom: u8,
}

impl MapView {
    pub fn new(center: Coordinates, zoom: u8) -> Self {
        Self {
            center,
            cursor: center,
            zoom: zoom.min(MAX_ZOOM),
        }
    }

    pub fn cursor(&self) -> Coordinates {
        self.cursor
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Re-center on `center` at `zoom`, moving the crosshair there too.
    pub fn set_view(&mut self, center: Coordinates, zoom: u8) {
        self.center = clamp(center);
        self.cursor = self.center;
        self.zoom = zoom.min(MAX_ZOOM);
    }

    pub fn zoom_by(&mut self, delta: i8) {
        self.zoom = (self.zoom as i16 + delta as i16).clamp(0, MAX_ZOOM as i16) as u8;
        self.center = self.cursor;
    }

    /// Longitude and latitude covered by the view.
    pub fn span(&self) -> (f64, f64) {
        let lon_span = 360.0 / 2_f64.powi(self.zoom as i32);
        (lon_span, (lon_span / 2.0).min(180.0))
    }

    pub fn x_bounds(&self) -> [f64; 2] {
        let (lon_span, _) = self.span();
        [
            self.center.longitude - lon_span / 2.0,
            self.center.longitude + lon_span / 2.0,
        ]
    }

    pub fn y_bounds(&self) -> [f64; 2] {
        let (_, lat_span) = self.span();
        [
            self.center.latitude - lat_span / 2.0,
            self.center.latitude + lat_span / 2.0,
        ]
    }

    /// Move the crosshair by whole steps, panning when it leaves the view.
    pub fn move_cursor(&mut self, lat_steps: i32, lon_steps: i32) {
        let (lon_span, lat_span) = self.span();
        self.cursor = clamp(Coordinates::new(
            self.cursor.latitude + lat_steps as f64 * lat_span / STEPS_PER_VIEW,
            self.cursor.longitude + lon_steps as f64 * lon_span / STEPS_PER_VIEW,
        ));

        let [west, east] = self.x_bounds();
        let [south, north] = self.y_bounds();
        if self.cursor.longitude < west || self.cursor.longitude > east {
            self.center.longitude += self.cursor.longitude
                - if self.cursor.longitude < west { west } else { east };
        }
        if self.cursor.latitude < south || self.cursor.latitude > north {
            self.center.latitude += self.cursor.latitude
                - if self.cursor.latitude < south { south } else { north };
        }
    }

    pub fn contains(&self, position: Coordinates) -> bool {
        let [west, east] = self.x_bounds();
        let [south, north] = self.y_bounds();
        (west..=east).contains(&position.longitude)
            && (south..=north).contains(&position.latitude)
    }

    pub fn render(
        &self,
        frame: &mut Frame,
        area: Rect,
        markers: &[Marker],
        theme: &Theme,
        focused: bool,
    ) {
        let title = format!(" Map · z{} · {} ", self.zoom, self.cursor);
        let border_style = if focused {
            Style::default().fg(theme.accent)
        } else {
            Style::default().fg(theme.muted)
        };
        let cursor = self.cursor;
        let land = theme.muted;
        let cursor_color = theme.accent;

        let canvas = Canvas::default()
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .title(title),
            )
            .marker(symbols::Marker::Braille)
            .x_bounds(self.x_bounds())
            .y_bounds(self.y_bounds())
            .paint(move |ctx| {
                ctx.draw(&Map {
                    color: land,
                    resolution: MapResolution::High,
                });
                ctx.layer();
                for marker in markers {
                    let point = (marker.position.longitude, marker.position.latitude);
                    ctx.draw(&Points {
                        coords: &[point],
                        color: marker.color,
                    });
                    let mut style = Style::default().fg(marker.color);
                    if marker.selected {
                        style = style.add_modifier(Modifier::BOLD | Modifier::REVERSED);
                    }
                    ctx.print(
                        point.0,
                        point.1,
                        Line::from(Span::styled(format!("● {}", marker.label), style)),
                    );
                }
                ctx.print(
                    cursor.longitude,
                    cursor.latitude,
                    Line::from(Span::styled(
                        "+",
                        Style::default()
                            .fg(cursor_color)
                            .add_modifier(Modifier::BOLD),
                    )),
                );
            });
        frame.render_widget(canvas, area);
    }
}

fn clamp(position: Coordinates) -> Coordinates {
    Coordinates::new(
        position.latitude.clamp(-90.0, 90.0),
        position.longitude.clamp(-180.0, 180.0),
    )
}
