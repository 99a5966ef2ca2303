use ratatui::style::{Color, Modifier, Style};

#[derive(Clone, Debug)]
pub struct Theme {
    pub bg: Color,
    pub fg: Color,
    pub accent: Color,
    pub warning: Color,
    pub error: Color,
    pub border: Color,
    pub highlight: Color,
    pub secondary: Color,
    pub user: Color,
    pub code: Color,
}

impl Theme {
    pub fn from_name(name: &str) -> Self {
        match name {
            "light" => Self::light(),
            "matrix" => Self::matrix(),
            _ => Self::dark(),
        }
    }

    pub fn dark() -> Self {
        Self {
            bg: Color::Rgb(17, 24, 39),         // gray-900
            fg: Color::Rgb(243, 244, 246),      // gray-100
            accent: Color::Rgb(239, 68, 68),    // red-500
            warning: Color::Rgb(251, 146, 60),  // orange-400
            error: Color::Rgb(254, 202, 202),   // red-200 on dark red
            border: Color::Rgb(55, 65, 81),     // gray-700
            highlight: Color::Rgb(248, 113, 113),
            secondary: Color::Rgb(107, 114, 128), // gray-500
            user: Color::Rgb(252, 165, 165),
            code: Color::Rgb(209, 213, 219),
        }
    }

    pub fn light() -> Self {
        Self {
            bg: Color::Rgb(250, 250, 250),
            fg: Color::Rgb(31, 41, 55),
            accent: Color::Rgb(220, 38, 38),
            warning: Color::Rgb(234, 88, 12),
            error: Color::Rgb(153, 27, 27),
            border: Color::Rgb(209, 213, 219),
            highlight: Color::Rgb(185, 28, 28),
            secondary: Color::Rgb(107, 114, 128),
            user: Color::Rgb(185, 28, 28),
            code: Color::Rgb(55, 65, 81),
        }
    }

    pub fn matrix() -> Self {
        Self {
            bg: Color::Black,
            fg: Color::Green,
            accent: Color::Rgb(0, 255, 0),
            warning: Color::Yellow,
            error: Color::Red,
            border: Color::Green,
            highlight: Color::Rgb(0, 255, 0),
            secondary: Color::Rgb(0, 150, 0),
            user: Color::Rgb(150, 255, 150),
            code: Color::Rgb(0, 200, 0),
        }
    }

    // Style helpers
    pub fn normal(&self) -> Style {
        Style::default().fg(self.fg).bg(self.bg)
    }

    pub fn accent(&self) -> Style {
        Style::default().fg(self.accent)
    }

    pub fn warning(&self) -> Style {
        Style::default().fg(self.warning)
    }

    pub fn error(&self) -> Style {
        Style::default().fg(self.error).add_modifier(Modifier::BOLD)
    }

    pub fn highlight(&self) -> Style {
        Style::default().fg(self.highlight).add_modifier(Modifier::BOLD)
    }

    pub fn secondary(&self) -> Style {
        Style::default().fg(self.secondary)
    }

    pub fn border(&self) -> Style {
        Style::default().fg(self.border)
    }

    pub fn user(&self) -> Style {
        Style::default().fg(self.user)
    }

    pub fn code(&self) -> Style {
        Style::default().fg(self.code)
    }

    pub fn label(&self) -> Style {
        self.secondary().add_modifier(Modifier::BOLD)
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}
