//! Display task: renders session events on the terminal.
//!
//! Messages are printed with a typing effect: the text appears character by
//! character, spread over the configured duration.

use std::{
    io::{self, Stdout, Write},
    time::Duration,
};

use darkcomm_shared::ChatMessage;
use tokio::sync::mpsc;

use crate::{
    colors::UserColors, formatter::MessageFormatter, history::MessageHistory,
    session::SessionEvent,
};

/// Erase the current terminal line and return to column 0.
const CLEAR_LINE: &str = "\r\x1b[2K";

pub struct Display<W> {
    username: String,
    colors: UserColors,
    history: MessageHistory,
    stream_duration: Duration,
    out: W,
}

impl Display<Stdout> {
    pub fn stdout(username: &str, stream_duration: Duration) -> Self {
        Self::new(username, stream_duration, io::stdout())
    }
}

impl<W: Write> Display<W> {
    pub fn new(username: &str, stream_duration: Duration, out: W) -> Self {
        let mut colors = UserColors::new();
        // The local user always gets the first colour
        colors.color_for(username);
        Self {
            username: username.to_string(),
            colors,
            history: MessageHistory::new(),
            stream_duration,
            out,
        }
    }

    #[cfg(test)]
    fn with_history(mut self, history: MessageHistory) -> Self {
        self.history = history;
        self
    }

    pub fn prompt(&mut self) -> String {
        let color = self.colors.color_for(&self.username);
        MessageFormatter::format_prompt(&self.username, color)
    }

    pub fn history(&self) -> &MessageHistory {
        &self.history
    }

    /// Render one event, then redraw the prompt.
    pub async fn handle(&mut self, event: SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::Message(message) => self.show_message(message).await,
            SessionEvent::Error(description) => {
                writeln!(
                    self.out,
                    "{}{}",
                    CLEAR_LINE,
                    MessageFormatter::format_error(&description)
                )?;
                self.out.flush()
            }
        }
    }

    async fn show_message(&mut self, message: ChatMessage) -> io::Result<()> {
        let entry = self.history.record(message);
        let (username, text) = (
            entry.message.username().to_string(),
            entry.message.text().to_string(),
        );

        write!(self.out, "{}", CLEAR_LINE)?;
        self.stream_text(&username, &text).await?;
        let prompt = self.prompt();
        write!(self.out, "{}", prompt)?;
        self.out.flush()
    }

    /// Print `[username]: text`, revealing the text over `stream_duration`.
    ///
    /// An empty text prints nothing.
    pub async fn stream_text(&mut self, username: &str, text: &str) -> io::Result<()> {
        let total_chars = text.chars().count();
        if total_chars == 0 {
            return Ok(());
        }

        let color = self.colors.color_for(username);
        write!(self.out, "{}", MessageFormatter::format_prefix(username, color))?;

        if self.stream_duration.is_zero() {
            writeln!(self.out, "{}", text)?;
            return self.out.flush();
        }

        let delay_per_char = self.stream_duration / total_chars as u32;
        for ch in text.chars() {
            write!(self.out, "{}", ch)?;
            self.out.flush()?;
            tokio::time::sleep(delay_per_char).await;
        }
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Consume session events until every sender is gone.
///
/// Returns the display so the caller can inspect the history.
pub async fn run_display<W: Write>(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    mut display: Display<W>,
) -> Display<W> {
    while let Some(event) = events.recv().await {
        if let Err(e) = display.handle(event).await {
            tracing::warn!("Failed to write to terminal: {}", e);
        }
    }
    display
}
