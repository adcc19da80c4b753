//! Terminal input handling.

use darkcomm_shared::{DEFAULT_USERNAME, MessageError, validate_username};
use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::mpsc;

use crate::{error::ClientError, formatter::MessageFormatter};

/// One result of reading the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Line(String),
    /// Ctrl+C
    Interrupted,
    /// Ctrl+D
    Eof,
}

/// Turn the answer to the username prompt into a username.
///
/// An empty answer selects [`DEFAULT_USERNAME`].
pub fn resolve_username_input(raw: &str) -> Result<String, MessageError> {
    if raw.trim().is_empty() {
        return Ok(DEFAULT_USERNAME.to_string());
    }
    validate_username(raw)
}

/// Ask for a username until a valid one is entered.
///
/// Blocks the calling thread; run it with `spawn_blocking`.
pub fn prompt_username() -> Result<String, ClientError> {
    let mut rl = DefaultEditor::new().map_err(|e| ClientError::Input(e.to_string()))?;
    let prompt = format!("Enter your username (default: {}): ", DEFAULT_USERNAME);

    loop {
        match rl.readline(&prompt) {
            Ok(answer) => match resolve_username_input(&answer) {
                Ok(username) => return Ok(username),
                Err(e) => println!("{}", MessageFormatter::format_error(&e.to_string())),
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                return Err(ClientError::Input("username prompt cancelled".to_string()));
            }
            Err(e) => return Err(ClientError::Input(e.to_string())),
        }
    }
}

/// Read lines on a dedicated thread and forward them to the returned channel.
///
/// The thread stops after Ctrl+C, Ctrl+D, a readline error, or once the
/// receiver is dropped and the next line has been read.
pub fn spawn_input_reader(prompt: String) -> mpsc::UnboundedReceiver<InputEvent> {
    let (input_tx, input_rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::error!("Failed to initialize readline: {}", e);
                let _ = input_tx.send(InputEvent::Eof);
                return;
            }
        };

        loop {
            let event = match rl.readline(&prompt) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        rl.add_history_entry(line.as_str()).ok();
                    }
                    InputEvent::Line(line)
                }
                Err(ReadlineError::Interrupted) => InputEvent::Interrupted,
                Err(ReadlineError::Eof) => InputEvent::Eof,
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    InputEvent::Eof
                }
            };

            let last = !matches!(event, InputEvent::Line(_));
            if input_tx.send(event).is_err() || last {
                break;
            }
        }
    });

    input_rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_answer_selects_default_username() {
        // テスト項目: 空の入力では既定のユーザー名 Anonymous になる
        // given (前提条件):
        let answer = "   ";

        // when (操作):
        let result = resolve_username_input(answer);

        // then (期待する結果):
        assert_eq!(result, Ok("Anonymous".to_string()));
    }

    #[test]
    fn test_answer_is_trimmed_and_validated() {
        // テスト項目: 入力は trim され、20 文字を超えるとエラーになる
        // given (前提条件):
        let valid = "  alice ";
        let too_long = "a".repeat(21);

        // when (操作):
        let accepted = resolve_username_input(valid);
        let rejected = resolve_username_input(&too_long);

        // then (期待する結果):
        assert_eq!(accepted, Ok("alice".to_string()));
        assert_eq!(rejected, Err(MessageError::InvalidUsername(21)));
    }
}
