//! Client session: one TCP connection with a send path and a receive path.
//!
//! The send path is driven by the caller (user input). The receive path runs
//! on its own task and reports through a [`SessionHandler`], so incoming
//! messages never wait on the user typing.

use std::{net::SocketAddr, sync::Arc};

use darkcomm_shared::{ChatCodec, ChatMessage, Frame};
use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{Mutex, mpsc, watch},
    task::JoinHandle,
};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::ClientError;

/// Typed command that ends the session.
pub const EXIT_COMMAND: &str = "exit";

/// Connection lifecycle. `Disconnected` after `Connected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Result of [`ClientSession::send_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Line was sent as a record
    Sent,
    /// Line was empty after trimming; nothing was sent
    Ignored,
    /// `exit` was typed: farewell sent and session closed
    Exited,
}

/// Receives what arrives on a session.
///
/// Called from the receive task, in arrival order.
#[cfg_attr(test, mockall::automock)]
pub trait SessionHandler: Send + Sync {
    /// A record arrived from the server
    fn on_message(&self, message: ChatMessage);

    /// The connection failed or was lost
    fn on_error(&self, description: String);
}

/// Event forwarded by [`ChannelHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Message(ChatMessage),
    Error(String),
}

/// [`SessionHandler`] that queues events for a separate display task.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Display queue closed, dropping session event");
        }
    }
}

impl SessionHandler for ChannelHandler {
    fn on_message(&self, message: ChatMessage) {
        self.forward(SessionEvent::Message(message));
    }

    fn on_error(&self, description: String) {
        self.forward(SessionEvent::Error(description));
    }
}

/// A connected chat session.
pub struct ClientSession {
    username: String,
    peer_addr: SocketAddr,
    writer: Mutex<Option<FramedWrite<OwnedWriteHalf, ChatCodec>>>,
    state_tx: Arc<watch::Sender<SessionState>>,
    handler: Arc<dyn SessionHandler>,
    receive_task: JoinHandle<()>,
}

impl ClientSession {
    /// Connect to `addr` and start the receive path.
    ///
    /// On failure the handler's `on_error` is called as well.
    pub async fn connect(
        addr: &str,
        username: &str,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Self, ClientError> {
        let state_tx = Arc::new(watch::Sender::new(SessionState::Disconnected));
        state_tx.send_replace(SessionState::Connecting);

        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                state_tx.send_replace(SessionState::Disconnected);
                tracing::error!("Failed to connect to server {}: {}", addr, e);
                handler.on_error(format!("Connection failed: {}", e));
                return Err(ClientError::ConnectionError(e.to_string()));
            }
        };
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| ClientError::ConnectionError(e.to_string()))?;
        tracing::info!("Connected to {}", peer_addr);

        let (reader, writer) = stream.into_split();
        state_tx.send_replace(SessionState::Connected);
        let receive_task = tokio::spawn(receive_loop(reader, handler.clone(), state_tx.clone()));

        Ok(Self {
            username: username.to_string(),
            peer_addr,
            writer: Mutex::new(Some(FramedWrite::new(writer, ChatCodec::new()))),
            state_tx,
            handler,
            receive_task,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Resolve once the session is disconnected, for any reason.
    pub async fn wait_disconnected(&self) {
        let mut state_rx = self.state_tx.subscribe();
        let _ = state_rx
            .wait_for(|state| *state == SessionState::Disconnected)
            .await;
    }

    /// Handle one line of user input.
    ///
    /// The line is trimmed; an empty line is ignored and `exit` sends the
    /// farewell record and closes the session.
    pub async fn send_line(&self, line: &str) -> Result<SendOutcome, ClientError> {
        let text = line.trim();
        if text.is_empty() {
            return Ok(SendOutcome::Ignored);
        }

        if text.eq_ignore_ascii_case(EXIT_COMMAND) {
            if let Err(e) = self.send_record(ChatMessage::left(&self.username)).await {
                tracing::warn!("Failed to send farewell: {}", e);
            }
            self.close().await;
            return Ok(SendOutcome::Exited);
        }

        self.send_record(ChatMessage::new(self.username.as_str(), text))
            .await?;
        Ok(SendOutcome::Sent)
    }

    /// Write one record. A write failure disconnects the session.
    pub async fn send_record(&self, record: ChatMessage) -> Result<(), ClientError> {
        let mut guard = self.writer.lock().await;
        let writer = match guard.as_mut() {
            Some(writer) if self.is_connected() => writer,
            _ => return Err(ClientError::NotConnected),
        };

        if let Err(e) = writer.send(record).await {
            tracing::error!("Failed to send message: {}", e);
            guard.take();
            if mark_disconnected(&self.state_tx) {
                self.handler.on_error(format!("Send failed: {}", e));
            }
            return Err(ClientError::SendFailed(e));
        }
        Ok(())
    }

    /// Close the connection. Idempotent.
    pub async fn close(&self) {
        self.state_tx.send_replace(SessionState::Disconnected);
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = SinkExt::<ChatMessage>::close(&mut writer).await {
                tracing::debug!("Error closing connection: {}", e);
            }
            tracing::info!("Disconnected from server");
        }
        self.receive_task.abort();
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.receive_task.abort();
    }
}

async fn receive_loop(
    reader: OwnedReadHalf,
    handler: Arc<dyn SessionHandler>,
    state_tx: Arc<watch::Sender<SessionState>>,
) {
    let mut frames = FramedRead::new(reader, ChatCodec::new());
    let description = loop {
        match frames.next().await {
            Some(Ok(Frame::Record(record))) => handler.on_message(record),
            Some(Ok(Frame::Malformed { line, reason })) => {
                tracing::error!("Received invalid JSON: {} ({})", line, reason);
            }
            Some(Err(e)) => break format!("Receive error: {}", e),
            None => break "Connection lost".to_string(),
        }
    };

    // A session closed locally, or already failed on send, reports nothing
    if mark_disconnected(&state_tx) {
        tracing::warn!("{}", description);
        handler.on_error(description);
    }
}

/// Move to `Disconnected`. Returns `true` only for the caller that ended a
/// connected session, so a loss is reported once.
fn mark_disconnected(state_tx: &watch::Sender<SessionState>) -> bool {
    state_tx.send_replace(SessionState::Disconnected) == SessionState::Connected
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use darkcomm_shared::encode_record;
    use mockall::predicate::eq;
    use tokio::{
        io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
        net::TcpListener,
    };

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - ClientSession の送信パス（trim、空行、exit）
    // - 受信パスから SessionHandler へのコールバック
    // - 切断時の状態遷移と on_error
    // ========================================

    const TIMEOUT: Duration = Duration::from_secs(2);

    /// Accept one connection on an ephemeral port, acting as the server.
    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    fn quiet_handler() -> Arc<dyn SessionHandler> {
        let mut mock = MockSessionHandler::new();
        mock.expect_on_message().returning(|_| ());
        mock.expect_on_error().returning(|_| ());
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_send_line_trims_and_ignores_empty() {
        // テスト項目: 入力は trim されて送信され、空入力は何も送らない
        // given (前提条件):
        let (listener, addr) = listen().await;
        let session = ClientSession::connect(&addr, "alice", quiet_handler())
            .await
            .unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(server_side).lines();

        // when (操作):
        let empty = session.send_line("   ").await.unwrap();
        let sent = session.send_line("  hello world \n").await.unwrap();

        // then (期待する結果):
        assert_eq!(empty, SendOutcome::Ignored);
        assert_eq!(sent, SendOutcome::Sent);
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, r#"{"username":"alice","text":"hello world"}"#);
    }

    #[tokio::test]
    async fn test_exit_sends_farewell_and_closes() {
        // テスト項目: exit でお別れメッセージを送信してからセッションを閉じる
        // given (前提条件):
        let (listener, addr) = listen().await;
        let session = ClientSession::connect(&addr, "alice", quiet_handler())
            .await
            .unwrap();
        let (server_side, _) = listener.accept().await.unwrap();
        let mut lines = BufReader::new(server_side).lines();

        // when (操作):
        let outcome = session.send_line("EXIT").await.unwrap();

        // then (期待する結果):
        assert_eq!(outcome, SendOutcome::Exited);
        assert_eq!(session.state(), SessionState::Disconnected);
        let farewell = lines.next_line().await.unwrap().unwrap();
        assert_eq!(farewell, r#"{"username":"alice","text":"alice left the chat!"}"#);
        assert_eq!(lines.next_line().await.unwrap(), None);
        assert!(matches!(
            session.send_line("too late").await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_received_records_reach_handler_in_order() {
        // テスト項目: 受信したレコードが到着順に on_message へ渡され、不正な行は無視される
        // given (前提条件):
        let (listener, addr) = listen().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mock = MockSessionHandler::new();
        mock.expect_on_message()
            .times(2)
            .returning(move |message| tx.send(message).unwrap());
        mock.expect_on_error().returning(|_| ());
        let session = ClientSession::connect(&addr, "bob", Arc::new(mock))
            .await
            .unwrap();
        let (mut server_side, _) = listener.accept().await.unwrap();

        // when (操作):
        let mut payload = encode_record(&ChatMessage::new("alice", "one")).unwrap().to_vec();
        payload.extend_from_slice(b"{oops\n\n");
        payload.extend_from_slice(&encode_record(&ChatMessage::new("alice", "two")).unwrap());
        server_side.write_all(&payload).await.unwrap();

        // then (期待する結果):
        let first = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(first, ChatMessage::new("alice", "one"));
        assert_eq!(second, ChatMessage::new("alice", "two"));
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_server_close_reports_connection_lost() {
        // テスト項目: サーバーが接続を閉じると on_error が 1 回呼ばれ、Disconnected になる
        // given (前提条件):
        let (listener, addr) = listen().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut mock = MockSessionHandler::new();
        mock.expect_on_message().never();
        mock.expect_on_error()
            .with(eq("Connection lost".to_string()))
            .times(1)
            .returning(move |description| tx.send(description).unwrap());
        let session = ClientSession::connect(&addr, "bob", Arc::new(mock))
            .await
            .unwrap();
        let (server_side, _) = listener.accept().await.unwrap();

        // when (操作):
        drop(server_side);

        // then (期待する結果):
        tokio::time::timeout(TIMEOUT, session.wait_disconnected())
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(rx.recv().await.as_deref(), Some("Connection lost"));
        assert!(matches!(
            session.send_line("hello?").await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_failure_reports_error() {
        // テスト項目: 接続に失敗すると ConnectionError を返し、on_error も呼ばれる
        // given (前提条件): 一度 bind して解放したポートには誰も待ち受けていない
        let (listener, addr) = listen().await;
        drop(listener);
        let mut mock = MockSessionHandler::new();
        mock.expect_on_error()
            .withf(|description| description.starts_with("Connection failed"))
            .times(1)
            .returning(|_| ());

        // when (操作):
        let result = ClientSession::connect(&addr, "alice", Arc::new(mock)).await;

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::ConnectionError(_))));
    }

    #[test]
    fn test_only_first_disconnect_reports() {
        // テスト項目: 送信失敗と受信終了が重なっても、接続中からの切断を報告するのは 1 回だけ
        // given (前提条件):
        let state_tx = watch::Sender::new(SessionState::Connected);

        // when (操作):
        let first = mark_disconnected(&state_tx);
        let second = mark_disconnected(&state_tx);

        // then (期待する結果):
        assert!(first);
        assert!(!second);
        assert_eq!(*state_tx.borrow(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_failure_and_connection_loss_report_once() {
        // テスト項目: 切断後に送信が失敗しても on_error は 1 回しか呼ばれない
        // given (前提条件):
        let (listener, addr) = listen().await;
        let mut mock = MockSessionHandler::new();
        mock.expect_on_message().never();
        mock.expect_on_error().times(1).returning(|_| ());
        let session = ClientSession::connect(&addr, "bob", Arc::new(mock))
            .await
            .unwrap();
        let (server_side, _) = listener.accept().await.unwrap();

        // when (操作):
        drop(server_side);
        for _ in 0..5 {
            let _ = session.send_line("hello?").await;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // then (期待する結果): 呼び出し回数はモックの drop 時に検証される
        tokio::time::timeout(TIMEOUT, session.wait_disconnected())
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_channel_handler_forwards_events() {
        // テスト項目: ChannelHandler はイベントを順番通りキューに流す
        // given (前提条件):
        let (handler, mut events) = ChannelHandler::new();

        // when (操作):
        handler.on_message(ChatMessage::new("alice", "hi"));
        handler.on_error("Connection lost".to_string());

        // then (期待する結果):
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Message(ChatMessage::new("alice", "hi")))
        );
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Error("Connection lost".to_string()))
        );
    }
}
