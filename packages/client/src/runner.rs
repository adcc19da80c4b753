//! Interactive client: username prompt, session, input loop and display.

use std::{sync::Arc, time::Duration};

use darkcomm_shared::ChatMessage;

use crate::{
    config::ClientConfig,
    display::{Display, run_display},
    error::ClientError,
    formatter::MessageFormatter,
    session::{ChannelHandler, ClientSession, SendOutcome},
    ui::{InputEvent, prompt_username, resolve_username_input, spawn_input_reader},
};

/// Time the display gets to finish printing queued messages after the
/// session ends.
const DISPLAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one chat session until the user leaves or the connection is lost.
pub async fn run_client(config: ClientConfig) -> Result<(), ClientError> {
    print!("{}", MessageFormatter::format_welcome());

    let username = match config.username.as_deref() {
        Some(raw) => resolve_username_input(raw)?,
        None => tokio::task::spawn_blocking(prompt_username)
            .await
            .map_err(|e| ClientError::Input(e.to_string()))??,
    };
    let server_addr = config.server_addr();
    tracing::info!("Connecting to {} as '{}'", server_addr, username);

    let (handler, events) = ChannelHandler::new();
    let mut display = Display::stdout(&username, config.stream_duration);
    let prompt = display.prompt();
    let display_task = tokio::spawn(run_display(events, display));

    let session = match ClientSession::connect(&server_addr, &username, Arc::new(handler)).await {
        Ok(session) => session,
        Err(e) => {
            // The failure was queued for the display; let it print
            finish_display(display_task).await;
            return Err(e);
        }
    };

    print!("{}", MessageFormatter::format_header(&server_addr, &username));
    session.send_record(ChatMessage::joined(&username)).await?;

    let mut input = spawn_input_reader(prompt);
    loop {
        tokio::select! {
            _ = session.wait_disconnected() => {
                tracing::info!("Session disconnected");
                break;
            }
            event = input.recv() => match event {
                Some(InputEvent::Line(line)) => match session.send_line(&line).await {
                    Ok(SendOutcome::Exited) => break,
                    Ok(SendOutcome::Sent) | Ok(SendOutcome::Ignored) => {}
                    Err(e) => {
                        tracing::warn!("Failed to send message: {}", e);
                        break;
                    }
                },
                Some(InputEvent::Interrupted) => {
                    if let Err(e) = session.send_record(ChatMessage::left(&username)).await {
                        tracing::warn!("Failed to send farewell: {}", e);
                    }
                    break;
                }
                Some(InputEvent::Eof) | None => break,
            }
        }
    }

    session.close().await;
    drop(session);

    if let Some(display) = finish_display(display_task).await {
        println!();
        println!("{}", MessageFormatter::format_session_summary(display.history()));
    }
    Ok(())
}

/// Wait for the display task to drain its queue.
async fn finish_display<W>(
    task: tokio::task::JoinHandle<Display<W>>,
) -> Option<Display<W>> {
    match tokio::time::timeout(DISPLAY_DRAIN_TIMEOUT, task).await {
        Ok(Ok(display)) => Some(display),
        Ok(Err(e)) => {
            tracing::error!("Display task failed: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("Display did not finish in time");
            None
        }
    }
}
