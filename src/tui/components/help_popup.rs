use crossterm::event::KeyCode;
use ratatui::{
    layout::Rect,
    style::Modifier,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem},
    Frame,
};

use crate::tui::{
    components::{centered_rect, Component},
    Event, Theme,
};

const HELP_CONTENT: &[(&str, &str)] = &[
    ("Chat", ""),
    ("  Enter", "Send message"),
    ("  Shift+Enter / Alt+Enter", "New line in message"),
    ("  Ctrl+L", "Wipe memory (clear chat)"),
    ("", ""),
    ("Scrolling", ""),
    ("  Up / Down", "Scroll one line"),
    ("  PgUp / PgDn", "Scroll one page"),
    ("  Ctrl+Home / Ctrl+End", "Jump to top / follow latest"),
    ("", ""),
    ("Voice", ""),
    ("  F2", "Start/stop dictation"),
    ("", ""),
    ("General", ""),
    ("  F1", "Show/hide this help"),
    ("  Ctrl+C / Ctrl+Q", "Quit"),
];

pub struct HelpPopup {
    is_visible: bool,
}

impl HelpPopup {
    pub fn new() -> Self {
        Self { is_visible: false }
    }

    pub fn hide(&mut self) {
        self.is_visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.is_visible
    }

    pub fn toggle(&mut self) {
        self.is_visible = !self.is_visible;
    }
}

impl Component for HelpPopup {
    fn render(&mut self, frame: &mut Frame, area: Rect, theme: &Theme) {
        if !self.is_visible {
            return;
        }

        let popup_area = centered_rect(60, HELP_CONTENT.len() as u16 + 2, area);
        frame.render_widget(Clear, popup_area);

        let items: Vec<ListItem> = HELP_CONTENT
            .iter()
            .map(|(key, description)| {
                if key.is_empty() {
                    ListItem::new(Line::from(""))
                } else if description.is_empty() {
                    ListItem::new(Line::from(Span::styled(
                        *key,
                        theme.accent().add_modifier(Modifier::BOLD),
                    )))
                } else {
                    ListItem::new(Line::from(vec![
                        Span::styled(*key, theme.highlight()),
                        Span::raw(": "),
                        Span::styled(*description, theme.normal()),
                    ]))
                }
            })
            .collect();

        let help_list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(theme.accent())
                    .title(" Help - Press F1 or Esc to close "),
            )
            .style(theme.normal());

        frame.render_widget(help_list, popup_area);
    }

    fn handle_event(&mut self, event: &Event) -> bool {
        if !self.is_visible {
            return false;
        }

        if let Event::Key(key) = event {
            if matches!(key.code, KeyCode::Esc | KeyCode::F(1) | KeyCode::Char('q')) {
                self.hide();
            }
            // Swallow everything else while open
            return true;
        }
        false
    }
}
