use ratatui::{
    layout::{Alignment, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::tui::{components::Component, Event, Theme};

#[derive(Clone, Debug, PartialEq)]
pub enum Activity {
    Idle,
    Streaming,
    Listening,
    Error(String),
}

pub struct StatusBar {
    status_message: String,
    model_info: String,
    activity: Activity,
}

impl StatusBar {
    pub fn new(model: &str) -> Self {
        Self {
            status_message: "Ready".to_string(),
            model_info: format!("gemini: {}", model),
            activity: Activity::Idle,
        }
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
    }

    #[cfg(test)]
    pub fn status(&self) -> &str {
        &self.status_message
    }

    pub fn set_activity(&mut self, activity: Activity) {
        self.activity = activity;
    }

    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    fn activity_indicator(&self, theme: &Theme) -> (&str, &str, Style) {
        match &self.activity {
            Activity::Idle => ("○", "Idle", theme.secondary()),
            Activity::Streaming => ("◐", "Receiving", theme.warning()),
            Activity::Listening => ("●", "Listening", theme.accent()),
            Activity::Error(err) => ("●", err.as_str(), theme.error()),
        }
    }
}

impl Component for StatusBar {
    fn render(&mut self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let (symbol, label, style) = self.activity_indicator(theme);

        let status_line = Line::from(vec![
            Span::styled(self.status_message.as_str(), theme.normal()),
            Span::raw(" | "),
            Span::styled(self.model_info.as_str(), theme.accent()),
            Span::raw(" | "),
            Span::styled(symbol, style),
            Span::raw(" "),
            Span::styled(label, theme.secondary()),
            Span::raw(" | "),
            Span::styled("F1: Help", theme.secondary()),
            Span::raw(" | "),
            Span::styled("F2: Voice", theme.secondary()),
            Span::raw(" | "),
            Span::styled("Ctrl+Q: Quit", theme.secondary()),
        ]);

        let paragraph = Paragraph::new(status_line)
            .block(Block::default().borders(Borders::TOP).border_style(theme.border()))
            .alignment(Alignment::Left);

        frame.render_widget(paragraph, area);
    }

    fn handle_event(&mut self, _event: &Event) -> bool {
        false
    }
}
