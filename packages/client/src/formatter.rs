//! Message formatting utilities for client display.

use colored::{Color, Colorize};
use darkcomm_shared::time::format_local_time;

use crate::history::MessageHistory;

const BANNER_WIDTH: usize = 60;

/// Message formatter for client display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format the welcome banner shown before the username prompt
    pub fn format_welcome() -> String {
        let rule = "═".repeat(BANNER_WIDTH);
        format!(
            "{}\n{}\n{}\n{}\n",
            rule.blue(),
            center("Secure Communication Terminal").bold().blue(),
            center("What happens in here, stays in here").italic().dimmed(),
            rule.blue()
        )
    }

    /// Format the header shown once connected
    ///
    /// # Arguments
    ///
    /// * `server_addr` - Address of the server (`host:port`)
    /// * `username` - The current user's name
    pub fn format_header(server_addr: &str, username: &str) -> String {
        let header = format!(
            "Connected to {} | User: {} | Type 'exit' to quit",
            server_addr, username
        );
        let rule = "─".repeat(header.chars().count());
        format!("{}\n{}\n", header.dimmed(), rule)
    }

    /// Format the `[username]: ` prefix of a chat line
    pub fn format_prefix(username: &str, color: Color) -> String {
        format!("{}: ", format!("[{}]", username).color(color))
    }

    /// Format the input prompt for the current user
    pub fn format_prompt(username: &str, color: Color) -> String {
        format!("{} > ", format!("[{}]", username).color(color))
    }

    /// Format a connection error
    pub fn format_error(description: &str) -> String {
        format!("Error: {}", description).red().to_string()
    }

    /// Format the line printed when the session ends
    ///
    /// # Arguments
    ///
    /// * `history` - Messages received during the session
    pub fn format_session_summary(history: &MessageHistory) -> String {
        let summary = match history.last() {
            Some(last) => format!(
                "Disconnected from chat server. {} message(s) received, last at {}.",
                history.len(),
                format_local_time(last.received_at)
            ),
            None => "Disconnected from chat server. No messages received.".to_string(),
        };
        summary.yellow().to_string()
    }
}

fn center(text: &str) -> String {
    let width = text.chars().count();
    let padding = BANNER_WIDTH.saturating_sub(width) / 2;
    format!("{}{}", " ".repeat(padding), text)
}
