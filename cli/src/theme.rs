use std::str::FromStr;

use ratatui::style::Color;

use crate::config::{ColorConfig, ConfigError, DisplayConfig};
use crate::presenter::PowerLevel;

/// Colors shared by the text and chart presenters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemeColors {
    pub normal: Color,
    pub warning: Color,
    pub critical: Color,
    pub fg: Color,
    pub muted: Color,
    pub accent: Color,
    pub border: Color,
    pub graph_line: Color,
}

impl ThemeColors {
    pub fn from_config(colors: &ColorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            normal: parse_color("normal", &colors.normal)?,
            warning: parse_color("warning", &colors.warning)?,
            critical: parse_color("critical", &colors.critical)?,
            fg: Color::Reset,
            muted: Color::DarkGray,
            accent: Color::Cyan,
            border: Color::DarkGray,
            graph_line: Color::Cyan,
        })
    }

    pub fn for_display(display: &DisplayConfig) -> Result<Self, ConfigError> {
        Self::from_config(&display.colors)
    }

    pub fn level(&self, level: PowerLevel) -> Color {
        match level {
            PowerLevel::Normal => self.normal,
            PowerLevel::Warning => self.warning,
            PowerLevel::Critical => self.critical,
        }
    }
}

fn parse_color(slot: &str, name: &str) -> Result<Color, ConfigError> {
    Color::from_str(name.trim()).map_err(|_| {
        ConfigError::Invalid(format!(
            "display.colors.{slot}: unknown color '{name}' (use a name like \"green\" or \"#rrggbb\")"
        ))
    })
}

/// Maps a ratatui color onto the crossterm palette for plain styled output.
pub fn to_crossterm(color: Color) -> crossterm::style::Color {
    use crossterm::style::Color as C;

    match color {
        Color::Reset => C::Reset,
        Color::Black => C::Black,
        Color::Red => C::DarkRed,
        Color::Green => C::DarkGreen,
        Color::Yellow => C::DarkYellow,
        Color::Blue => C::DarkBlue,
        Color::Magenta => C::DarkMagenta,
        Color::Cyan => C::DarkCyan,
        Color::Gray => C::Grey,
        Color::DarkGray => C::DarkGrey,
        Color::LightRed => C::Red,
        Color::LightGreen => C::Green,
        Color::LightYellow => C::Yellow,
        Color::LightBlue => C::Blue,
        Color::LightMagenta => C::Magenta,
        Color::LightCyan => C::Cyan,
        Color::White => C::White,
        Color::Rgb(r, g, b) => C::Rgb { r, g, b },
        Color::Indexed(i) => C::AnsiValue(i),
    }
}
