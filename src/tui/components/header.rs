use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Modifier,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::tui::{components::Component, Event, Theme};

/// Persona title bar with the clear-chat hint.
pub struct Header {
    name: String,
    tagline: String,
}

impl Header {
    pub fn new(name: impl Into<String>, tagline: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tagline: tagline.into(),
        }
    }
}

impl Component for Header {
    fn render(&mut self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let block = Block::default()
            .borders(Borders::BOTTOM)
            .border_style(theme.border());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(1), Constraint::Length(24)])
            .split(inner);

        let title = Line::from(vec![
            Span::styled("◆ ", theme.accent()),
            Span::styled(
                self.name.to_uppercase(),
                theme.normal().add_modifier(Modifier::BOLD),
            ),
            Span::raw("  "),
            Span::styled(self.tagline.as_str(), theme.accent()),
        ]);
        frame.render_widget(Paragraph::new(title), columns[0]);

        let hint = Line::from(vec![
            Span::styled("Ctrl+L", theme.highlight()),
            Span::styled(" wipe memory", theme.secondary()),
        ]);
        frame.render_widget(Paragraph::new(hint).alignment(Alignment::Right), columns[1]);
    }

    fn handle_event(&mut self, _event: &Event) -> bool {
        false
    }
}
