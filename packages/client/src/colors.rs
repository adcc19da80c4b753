//! Per-session username colours.

use std::collections::HashMap;

use colored::Color;

/// Colours handed out to usernames, in assignment order.
pub const PALETTE: [Color; 13] = [
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::White,
    Color::BrightRed,
    Color::BrightGreen,
    Color::BrightYellow,
    Color::BrightBlue,
    Color::BrightMagenta,
    Color::BrightCyan,
];

/// Username → colour map, assigned lazily and stable for the session.
#[derive(Debug, Default)]
pub struct UserColors {
    assigned: HashMap<String, Color>,
}

impl UserColors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Colour of `username`, assigning one on first sight.
    ///
    /// A new username gets the first palette colour nobody has yet; once the
    /// palette is exhausted colours are reused in palette order.
    pub fn color_for(&mut self, username: &str) -> Color {
        if let Some(color) = self.assigned.get(username) {
            return *color;
        }

        let color = PALETTE
            .iter()
            .copied()
            .find(|candidate| !self.assigned.values().any(|used| used == candidate))
            .unwrap_or(PALETTE[self.assigned.len() % PALETTE.len()]);
        self.assigned.insert(username.to_string(), color);
        color
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
