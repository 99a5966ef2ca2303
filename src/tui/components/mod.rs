pub mod chat_view;
pub mod confirm_dialog;
pub mod header;
pub mod help_popup;
pub mod input_box;
pub mod status_bar;

use ratatui::{layout::Rect, Frame};
use crate::tui::{Event, Theme};

pub use chat_view::ChatView;
pub use confirm_dialog::ConfirmDialog;
pub use header::Header;
pub use help_popup::HelpPopup;
pub use input_box::InputBox;
pub use status_bar::StatusBar;

/// Base trait for all TUI components
pub trait Component {
    /// Render the component
    fn render(&mut self, frame: &mut Frame, area: Rect, theme: &Theme);

    /// Handle input events, returning whether the event was consumed
    fn handle_event(&mut self, event: &Event) -> bool;

    /// Advance animations
    fn update(&mut self) {}
}

/// Rectangle of `percent_x` by `height` rows centered in `area`.
pub fn centered_rect(percent_x: u16, height: u16, area: Rect) -> Rect {
    let width = (area.width * percent_x / 100).max(20).min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width.saturating_sub(width)) / 2,
        y: area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    }
}
