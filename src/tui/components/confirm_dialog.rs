use crossterm::event::KeyCode;
use ratatui::{
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::tui::{
    components::{centered_rect, Component},
    Event, Theme,
};

/// Modal yes/no prompt. The answer is collected with [`ConfirmDialog::take_decision`].
pub struct ConfirmDialog {
    message: String,
    is_visible: bool,
    decision: Option<bool>,
}

impl ConfirmDialog {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_visible: false,
            decision: None,
        }
    }

    pub fn show(&mut self) {
        self.is_visible = true;
        self.decision = None;
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    pub fn take_decision(&mut self) -> Option<bool> {
        self.decision.take()
    }

    fn answer(&mut self, yes: bool) {
        self.decision = Some(yes);
        self.is_visible = false;
    }
}

impl Component for ConfirmDialog {
    fn render(&mut self, frame: &mut Frame, area: Rect, theme: &Theme) {
        if !self.is_visible {
            return;
        }

        let dialog_area = centered_rect(50, 5, area);
        frame.render_widget(Clear, dialog_area);

        let lines = vec![
            Line::from(Span::styled(self.message.as_str(), theme.normal())),
            Line::from(vec![
                Span::styled("y", theme.highlight()),
                Span::raw(": yes   "),
                Span::styled("n", theme.highlight()),
                Span::raw(": no"),
            ]),
        ];

        let paragraph = Paragraph::new(lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.warning())
                    .title(" Confirm "),
            )
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .style(theme.normal());

        frame.render_widget(paragraph, dialog_area);
    }

    fn handle_event(&mut self, event: &Event) -> bool {
        if !self.is_visible {
            return false;
        }

        if let Event::Key(key) = event {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => self.answer(true),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => self.answer(false),
                _ => {}
            }
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEvent, KeyModifiers};

    fn key(code: KeyCode) -> Event {
        Event::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_yes_and_no() {
        let mut dialog = ConfirmDialog::new("Clear the chat history?");
        dialog.show();
        assert!(dialog.handle_event(&key(KeyCode::Char('x'))));
        assert_eq!(dialog.take_decision(), None);

        dialog.handle_event(&key(KeyCode::Char('y')));
        assert!(!dialog.is_visible());
        assert_eq!(dialog.take_decision(), Some(true));
        assert_eq!(dialog.take_decision(), None);

        dialog.show();
        dialog.handle_event(&key(KeyCode::Esc));
        assert_eq!(dialog.take_decision(), Some(false));
    }

    #[test]
    fn test_hidden_dialog_ignores_keys() {
        let mut dialog = ConfirmDialog::new("?");
        assert!(!dialog.handle_event(&key(KeyCode::Char('y'))));
        assert_eq!(dialog.take_decision(), None);
    }
}
