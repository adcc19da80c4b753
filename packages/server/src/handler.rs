//! Per-connection receive loop.

use std::{fmt, net::SocketAddr};

use darkcomm_shared::{ChatCodec, CodecError, Frame};
use futures_util::StreamExt;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_util::codec::FramedRead;

use crate::{registry::PeerConnection, state::AppState};

/// Why a receive loop ended.
#[derive(Debug)]
pub enum DisconnectReason {
    /// Peer closed its end of the stream
    PeerClosed,
    /// Connection was closed by the server (shutdown or failed broadcast)
    ClosedByServer,
    /// Read failed or a line exceeded the limit
    Transport(CodecError),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::PeerClosed => write!(f, "closed by peer"),
            DisconnectReason::ClosedByServer => write!(f, "closed by server"),
            DisconnectReason::Transport(e) => write!(f, "{}", e),
        }
    }
}

/// Serve one accepted TCP connection until it ends.
pub async fn handle_stream(stream: TcpStream, addr: SocketAddr, state: &AppState) {
    let (reader, writer) = stream.into_split();
    serve_connection(reader, writer, addr, state).await;
}

/// Register the connection, run its receive loop, then clean up exactly once.
///
/// Never fails: decode errors skip a line, transport errors end the loop.
pub async fn serve_connection<R, W>(
    reader: R,
    writer: W,
    addr: SocketAddr,
    state: &AppState,
) -> DisconnectReason
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let peer = state.registry.register(writer, addr).await;
    tracing::info!(
        "New connection from {} ({}), {} client(s) connected",
        addr,
        peer.id(),
        state.registry.count().await
    );

    let mut frames = FramedRead::new(reader, state.codec());
    let reason = receive_loop(&peer, &mut frames, state).await;

    let removed = state.registry.remove(peer.id()).await;
    peer.close().await;

    match removed {
        Some(removed) => {
            let username = removed.username.as_deref().unwrap_or("Unknown");
            match &reason {
                DisconnectReason::Transport(e) => {
                    tracing::error!("Error handling client {} ({}): {}", username, addr, e);
                }
                _ => {
                    tracing::info!("Client {} ({}) disconnected: {}", username, addr, reason);
                }
            }
        }
        None => {
            tracing::debug!(
                "Connection {} ({}) already removed: {}",
                peer.id(),
                addr,
                reason
            );
        }
    }
    reason
}

async fn receive_loop<R>(
    peer: &PeerConnection,
    frames: &mut FramedRead<R, ChatCodec>,
    state: &AppState,
) -> DisconnectReason
where
    R: AsyncRead + Unpin,
{
    loop {
        let next = tokio::select! {
            _ = peer.closed() => return DisconnectReason::ClosedByServer,
            next = frames.next() => next,
        };

        match next {
            None => return DisconnectReason::PeerClosed,
            Some(Err(e)) => return DisconnectReason::Transport(e),
            Some(Ok(Frame::Malformed { line, reason })) => {
                tracing::error!("Invalid JSON from {}: {} ({})", peer.addr(), line, reason);
            }
            Some(Ok(Frame::Record(record))) => {
                state
                    .registry
                    .update_username(peer.id(), record.username())
                    .await;
                tracing::info!("Message from {}: {}", record.username(), record.text());

                if let Err(e) = state.broadcaster.broadcast(&record, peer.id()).await {
                    tracing::error!("Failed to broadcast message from {}: {}", peer.addr(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};

    use darkcomm_shared::{ChatMessage, encode_record};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - serve_connection の受信ループとクリーンアップ
    //
    // 【どのようなシナリオをテストするか】
    // 1. 不正な JSON 行の後も受信ループが続き、次の行が配信される
    // 2. ピアが閉じると登録が外れる
    // 3. サーバー側から close するとループが終了する
    // 4. 行長上限を超えると接続が切られる
    // ========================================

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// Register a plain listener peer that only receives broadcasts.
    async fn register_listener(state: &AppState, port: u16) -> DuplexStream {
        let (server_side, client_side) = duplex(4096);
        state.registry.register(server_side, addr(port)).await;
        client_side
    }

    async fn wait_for_count(state: &AppState, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while state.registry.count().await != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("registry count did not reach the expected value");
    }

    #[tokio::test]
    async fn test_invalid_json_does_not_end_loop() {
        // テスト項目: 不正な JSON 行があっても接続は維持され、次の有効な行が配信される
        // given (前提条件):
        let state = Arc::new(AppState::new(None));
        let mut listener = register_listener(&state, 6001).await;
        let (mut client, server_read) = duplex(4096);
        let (server_write, _client_read) = duplex(4096);
        let task = {
            let state = state.clone();
            tokio::spawn(async move {
                serve_connection(server_read, server_write, addr(6002), &state).await
            })
        };

        // when (操作):
        client
            .write_all(b"not json at all\n\n{\"username\":\"alice\",\"text\":\"hi\"}\n")
            .await
            .unwrap();

        // then (期待する結果):
        let expected = encode_record(&ChatMessage::new("alice", "hi")).unwrap();
        let mut received = vec![0u8; expected.len()];
        listener.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);
        assert_eq!(state.registry.count().await, 2);

        drop(client);
        let reason = task.await.unwrap();
        assert!(matches!(reason, DisconnectReason::PeerClosed));
        assert_eq!(state.registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_username_is_recorded_from_records() {
        // テスト項目: 受信したレコードの username が接続のメタデータに記録される
        // given (前提条件):
        let state = Arc::new(AppState::new(None));
        let (mut client, server_read) = duplex(4096);
        let (server_write, _client_read) = duplex(4096);
        let task = {
            let state = state.clone();
            tokio::spawn(async move {
                serve_connection(server_read, server_write, addr(6002), &state).await
            })
        };

        // when (操作):
        client
            .write_all(b"{\"username\":\"alice\",\"text\":\"hi\"}\n")
            .await
            .unwrap();

        // then (期待する結果):
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if state.registry.usernames().await == vec![Some("alice".to_string())] {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("username was not recorded");

        drop(client);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_by_server_ends_loop() {
        // テスト項目: サーバー側から接続を閉じると、読み込み待ちのループが終了する
        // given (前提条件):
        let state = Arc::new(AppState::new(None));
        let (_client, server_read) = duplex(4096);
        let (server_write, _client_read) = duplex(4096);
        let task = {
            let state = state.clone();
            tokio::spawn(async move {
                serve_connection(server_read, server_write, addr(6002), &state).await
            })
        };
        wait_for_count(&state, 1).await;

        // when (操作):
        for removed in state.registry.drain().await {
            removed.connection.close().await;
        }

        // then (期待する結果):
        let reason = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("receive loop should end")
            .unwrap();
        assert!(matches!(reason, DisconnectReason::ClosedByServer));
        assert_eq!(state.registry.count().await, 0);
    }

    #[tokio::test]
    async fn test_line_too_long_drops_connection() {
        // テスト項目: 行長上限を超えた接続は切断され、レジストリから削除される
        // given (前提条件):
        let state = Arc::new(AppState::new(Some(32)));
        let (mut client, server_read) = duplex(4096);
        let (server_write, _client_read) = duplex(4096);
        let task = {
            let state = state.clone();
            tokio::spawn(async move {
                serve_connection(server_read, server_write, addr(6002), &state).await
            })
        };

        // when (操作):
        client.write_all(&[b'x'; 64]).await.unwrap();

        // then (期待する結果):
        let reason = task.await.unwrap();
        assert!(matches!(
            reason,
            DisconnectReason::Transport(CodecError::LineTooLong { limit: 32 })
        ));
        assert_eq!(state.registry.count().await, 0);
    }
}
