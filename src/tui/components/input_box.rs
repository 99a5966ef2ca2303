use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Alignment, Rect},
    text::{Line, Span},
    widgets::{
        block::{Position, Title},
        Block, Borders, Paragraph,
    },
    Frame,
};
use tui_input::{backend::crossterm::EventHandler, Input};

use crate::tui::{components::Component, Event, Theme};
use omnichat::platform::append_transcript;

const MAX_VISIBLE_LINES: usize = 5;

/// Multi-line composer. Finished lines live in `lines`; the line under the
/// cursor is edited through `tui_input`.
#[derive(Debug, Clone)]
pub struct InputBox {
    input: Input,
    lines: Vec<String>,
    placeholder: String,
    footer: String,
    is_disabled: bool,
}

impl InputBox {
    pub fn new(placeholder: impl Into<String>, footer: impl Into<String>) -> Self {
        Self {
            input: Input::default(),
            lines: Vec::new(),
            placeholder: placeholder.into(),
            footer: footer.into(),
            is_disabled: false,
        }
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.is_disabled = disabled;
    }

    pub fn clear(&mut self) {
        self.input.reset();
        self.lines.clear();
    }

    pub fn get_content(&self) -> String {
        let mut content = self.lines.join("\n");
        if !self.lines.is_empty() {
            content.push('\n');
        }
        content.push_str(self.input.value());
        content
    }

    pub fn set_content(&mut self, content: &str) {
        let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
        let current = lines.pop().unwrap_or_default();
        self.lines = lines;
        self.input = Input::new(current);
    }

    /// Appends a dictated fragment, separated from existing text by one space.
    pub fn append_text(&mut self, fragment: &str) {
        let content = append_transcript(&self.get_content(), fragment);
        self.set_content(&content);
    }

    pub fn is_empty(&self) -> bool {
        self.get_content().trim().is_empty()
    }

    /// Rows needed to show the content, borders included.
    pub fn desired_height(&self) -> u16 {
        (self.lines.len() + 1).min(MAX_VISIBLE_LINES) as u16 + 2
    }

    fn break_line(&mut self) {
        let cursor = self.input.cursor();
        let value = self.input.value();
        let split_at = value
            .char_indices()
            .nth(cursor)
            .map(|(idx, _)| idx)
            .unwrap_or(value.len());
        let (head, tail) = value.split_at(split_at);

        self.lines.push(head.to_string());
        self.input = Input::new(tail.to_string()).with_cursor(0);
    }

    fn join_with_previous(&mut self) -> bool {
        if self.input.cursor() > 0 {
            return false;
        }
        let Some(previous) = self.lines.pop() else {
            return false;
        };
        let cursor = previous.chars().count();
        self.input = Input::new(format!("{}{}", previous, self.input.value())).with_cursor(cursor);
        true
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        match key.code {
            KeyCode::Enter
                if key.modifiers.intersects(KeyModifiers::SHIFT | KeyModifiers::ALT) =>
            {
                self.break_line();
                true
            }
            // Plain Enter sends; the parent handles it
            KeyCode::Enter => false,
            KeyCode::Backspace if self.join_with_previous() => true,
            _ => {
                if key.modifiers.contains(KeyModifiers::CONTROL)
                    || key.modifiers.contains(KeyModifiers::ALT)
                {
                    // Leave shortcuts to the global handler
                    false
                } else {
                    self.input.handle_event(&crossterm::event::Event::Key(key));
                    true
                }
            }
        }
    }
}

impl Component for InputBox {
    fn render(&mut self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let (border_style, title) = if self.is_disabled {
            (theme.border(), " Waiting for reply... ")
        } else {
            (theme.accent(), " Message ")
        };

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title)
            .title(
                Title::from(Span::styled(format!(" {} ", self.footer), theme.secondary()))
                    .position(Position::Bottom)
                    .alignment(Alignment::Center),
            );

        let inner = block.inner(area);
        let available_width = inner.width as usize;
        let available_rows = inner.height as usize;

        if self.is_empty() && self.lines.is_empty() {
            let paragraph = Paragraph::new(Line::from(Span::styled(
                self.placeholder.as_str(),
                theme.secondary(),
            )))
            .block(block)
            .style(theme.normal());
            frame.render_widget(paragraph, area);

            if !self.is_disabled {
                frame.set_cursor(inner.x, inner.y);
            }
            return;
        }

        let text_style = if self.is_disabled {
            theme.secondary()
        } else {
            theme.normal()
        };

        // Horizontal scroll for the line being edited
        let cursor_pos = self.input.visual_cursor();
        let scroll_offset = if cursor_pos >= available_width {
            cursor_pos.saturating_sub(available_width) + 1
        } else {
            0
        };
        let current: String = self
            .input
            .value()
            .chars()
            .skip(scroll_offset)
            .take(available_width)
            .collect();

        let mut rows: Vec<Line> = self
            .lines
            .iter()
            .map(|line| Line::from(Span::styled(line.as_str(), text_style)))
            .collect();
        rows.push(Line::from(Span::styled(current, text_style)));

        // Keep the edited line in view
        let first_row = rows.len().saturating_sub(available_rows);
        let cursor_row = rows.len() - 1 - first_row;
        let visible: Vec<Line> = rows.into_iter().skip(first_row).collect();

        let paragraph = Paragraph::new(visible).block(block).style(theme.normal());
        frame.render_widget(paragraph, area);

        if !self.is_disabled {
            let cursor_x = inner.x + cursor_pos.saturating_sub(scroll_offset) as u16;
            let cursor_y = inner.y + cursor_row as u16;
            if cursor_x < inner.x + inner.width {
                frame.set_cursor(cursor_x, cursor_y);
            }
        }
    }

    fn handle_event(&mut self, event: &Event) -> bool {
        if self.is_disabled {
            return false;
        }

        match event {
            Event::Key(key) => self.handle_key(*key),
            _ => false,
        }
    }
}
