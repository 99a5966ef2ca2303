use crossterm::event::{KeyCode, KeyModifiers};
use ratatui::{
    layout::{Alignment, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::tui::{components::Component, Event, Theme};
use omnichat::chat::{ChatMessage, ChatState};
use omnichat::markdown::{split_code_blocks, Segment};

const USER_LABEL: &str = "Client";
const DOT_FRAMES: usize = 3;

pub struct ChatView {
    state: ChatState,
    persona_name: String,
    greeting: String,
    auto_scroll: bool,
    scroll_offset: usize,
    page_height: usize,
    spinner_frame: usize,
}

impl ChatView {
    pub fn new(persona_name: impl Into<String>, greeting: impl Into<String>) -> Self {
        Self {
            state: ChatState::new(),
            persona_name: persona_name.into(),
            greeting: greeting.into(),
            auto_scroll: true,
            scroll_offset: 0,
            page_height: 10,
            spinner_frame: 0,
        }
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ChatState {
        &mut self.state
    }

    #[cfg(test)]
    pub fn is_following(&self) -> bool {
        self.auto_scroll
    }

    pub fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
        self.auto_scroll = false;
    }

    pub fn scroll_down(&mut self, lines: usize) {
        // Clamped in render, which also resumes following at the bottom
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
        self.auto_scroll = false;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_offset = usize::MAX;
        self.auto_scroll = true;
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
        self.auto_scroll = false;
    }

    fn typing_indicator(&self, theme: &Theme) -> Line<'static> {
        let active = self.spinner_frame % DOT_FRAMES;
        let mut spans = vec![Span::styled(
            format!("{} is typing ", self.persona_name),
            theme.secondary(),
        )];
        for dot in 0..DOT_FRAMES {
            let style = if dot == active {
                theme.accent()
            } else {
                theme.secondary()
            };
            spans.push(Span::styled("● ", style));
        }
        Line::from(spans)
    }

    fn empty_state(&self, theme: &Theme, height: usize) -> Vec<Line<'static>> {
        let mut lines = vec![Line::from(""); height.saturating_sub(3) / 2];
        lines.push(Line::from(Span::styled("⚡", theme.accent())).alignment(Alignment::Center));
        lines.push(
            Line::from(Span::styled(
                format!("{} is online.", self.persona_name),
                theme.normal().add_modifier(Modifier::BOLD),
            ))
            .alignment(Alignment::Center),
        );
        lines.push(
            Line::from(Span::styled(self.greeting.clone(), theme.secondary()))
                .alignment(Alignment::Center),
        );
        lines
    }

    /// All display lines for the conversation at `width` columns.
    fn build_lines(&self, width: usize, theme: &Theme) -> Vec<Line<'static>> {
        let bubble_width = (width * 3 / 4).max(10).min(width.max(1));
        let mut lines = Vec::new();

        for message in self.state.messages() {
            // The empty placeholder is represented by the typing indicator
            if !message.is_user() && message.text.is_empty() {
                continue;
            }

            lines.push(self.header_line(message, theme));
            if message.is_user() {
                render_user_body(&mut lines, &message.text, bubble_width, theme);
            } else if message.is_error {
                render_prose(&mut lines, &message.text, bubble_width, theme.error(), theme.error());
            } else {
                render_model_body(&mut lines, &message.text, bubble_width, theme);
            }
            lines.push(Line::from(""));
        }

        lines
    }

    fn header_line(&self, message: &ChatMessage, theme: &Theme) -> Line<'static> {
        let (label, style) = if message.is_user() {
            (USER_LABEL.to_string(), theme.user().add_modifier(Modifier::BOLD))
        } else if message.is_error {
            (self.persona_name.clone(), theme.error())
        } else {
            (self.persona_name.clone(), theme.accent().add_modifier(Modifier::BOLD))
        };
        let timestamp = message
            .timestamp
            .with_timezone(&chrono::Local)
            .format("%H:%M")
            .to_string();

        let line = Line::from(vec![
            Span::styled(label, style),
            Span::styled(format!(" · {}", timestamp), theme.secondary()),
        ]);
        if message.is_user() {
            line.alignment(Alignment::Right)
        } else {
            line
        }
    }
}

fn render_user_body(lines: &mut Vec<Line<'static>>, text: &str, width: usize, theme: &Theme) {
    for row in wrap_text(text, width.saturating_sub(2)) {
        lines.push(
            Line::from(vec![
                Span::styled(row, theme.user()),
                Span::styled(" │", theme.user()),
            ])
            .alignment(Alignment::Right),
        );
    }
}

fn render_prose(
    lines: &mut Vec<Line<'static>>,
    text: &str,
    width: usize,
    gutter: Style,
    style: Style,
) {
    for row in wrap_text(text, width.saturating_sub(2)) {
        lines.push(Line::from(vec![
            Span::styled("│ ", gutter),
            Span::styled(row, style),
        ]));
    }
}

fn render_model_body(lines: &mut Vec<Line<'static>>, text: &str, width: usize, theme: &Theme) {
    for segment in split_code_blocks(text) {
        match segment {
            Segment::Text(prose) => {
                // Fences eat the newline that separated them from prose
                let prose = prose.trim_matches('\n');
                if !prose.is_empty() {
                    render_prose(lines, prose, width, theme.accent(), theme.normal());
                }
            }
            Segment::Code { language, code } => {
                lines.push(Line::from(vec![
                    Span::styled("│ ", theme.accent()),
                    Span::styled("┌─ ", theme.border()),
                    Span::styled(language.unwrap_or("code").to_string(), theme.label()),
                ]));
                for row in code.split('\n') {
                    for piece in wrap_hard(row, width.saturating_sub(4)) {
                        lines.push(Line::from(vec![
                            Span::styled("│ ", theme.accent()),
                            Span::styled("│ ", theme.border()),
                            Span::styled(piece, theme.code()),
                        ]));
                    }
                }
                lines.push(Line::from(vec![
                    Span::styled("│ ", theme.accent()),
                    Span::styled("└─", theme.border()),
                ]));
            }
        }
    }
}

/// Word-wraps `text` to `width` display columns, keeping blank lines.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();

    for line in text.split('\n') {
        if line.width() <= width {
            lines.push(line.to_string());
            continue;
        }

        let mut current = String::new();
        for word in line.split_whitespace() {
            let needed = if current.is_empty() {
                word.width()
            } else {
                current.width() + 1 + word.width()
            };

            if needed <= width {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if word.width() <= width {
                current.push_str(word);
            } else {
                let mut pieces = wrap_hard(word, width);
                current = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
        }
        lines.push(current);
    }

    lines
}

/// Breaks `text` every `width` display columns regardless of words.
fn wrap_hard(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;

    for c in text.chars() {
        let char_width = c.width().unwrap_or(0);
        if current_width + char_width > width && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(c);
        current_width += char_width;
    }
    pieces.push(current);
    pieces
}

impl Component for ChatView {
    fn render(&mut self, frame: &mut Frame, area: Rect, theme: &Theme) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(theme.border());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let content_width = inner.width.saturating_sub(1) as usize;
        let content_height = inner.height as usize;
        self.page_height = content_height.max(1);

        if self.state.is_empty() {
            let paragraph = Paragraph::new(self.empty_state(theme, content_height)).style(theme.normal());
            frame.render_widget(paragraph, inner);
            return;
        }

        let mut all_lines = self.build_lines(content_width, theme);
        if self.state.is_loading() {
            all_lines.push(self.typing_indicator(theme));
        }

        let total_lines = all_lines.len();
        let max_scroll = total_lines.saturating_sub(content_height);
        if self.auto_scroll || self.scroll_offset >= max_scroll {
            self.scroll_offset = max_scroll;
            self.auto_scroll = true;
        }

        let visible_lines: Vec<Line> = all_lines
            .into_iter()
            .skip(self.scroll_offset)
            .take(content_height)
            .collect();

        frame.render_widget(Paragraph::new(visible_lines).style(theme.normal()), inner);
    }

    fn handle_event(&mut self, event: &Event) -> bool {
        let Event::Key(key) = event else {
            return false;
        };

        match (key.code, key.modifiers) {
            (KeyCode::Up, _) => self.scroll_up(1),
            (KeyCode::Down, _) => self.scroll_down(1),
            (KeyCode::PageUp, _) => self.scroll_up(self.page_height),
            (KeyCode::PageDown, _) => self.scroll_down(self.page_height),
            (KeyCode::Home, KeyModifiers::CONTROL) => self.scroll_to_top(),
            (KeyCode::End, KeyModifiers::CONTROL) => self.scroll_to_bottom(),
            _ => return false,
        }
        true
    }

    fn update(&mut self) {
        if self.state.is_loading() {
            self.spinner_frame = self.spinner_frame.wrapping_add(1);
        }
    }
}
