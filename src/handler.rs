//! Connection handler
//!
//! Handles individual client connections: line framing, the read loop,
//! the idle monitor and teardown when the connection ends.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::idle::{IdleMonitor, IdleState};
use crate::server::ChatServer;
use crate::session::Session;

/// Handle a new TCP connection
pub async fn handle_connection(
    stream: TcpStream,
    server: Arc<ChatServer>,
) -> Result<(), ChatError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    serve(stream, peer_addr, server).await
}

/// Run one session over any duplex byte stream
///
/// Returns once the session has been torn down and its mailbox drained.
/// A read failure is returned after teardown; end of stream and eviction
/// return `Ok`.
pub async fn serve<S>(
    stream: S,
    peer_addr: String,
    server: Arc<ChatServer>,
) -> Result<(), ChatError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let (session, write_task) =
        Session::create(writer, peer_addr, server.config().write_timeout());

    if let Err(e) = server.online(&session).await {
        session.close_mailbox();
        session.cancel();
        let _ = write_task.await;
        return Err(e);
    }

    let idle = {
        let server = Arc::clone(&server);
        let session = Arc::clone(&session);
        IdleMonitor::spawn(
            server.config().idle_timeout(),
            session.cancellation(),
            move || async move {
                info!("Session {} idle, evicting", session.identity());
                server.evict(&session).await;
            },
        )
    };

    let cancel = session.cancellation();
    let mut lines = FramedRead::new(
        reader,
        LinesCodec::new_with_max_length(server.config().max_line_length),
    );

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            next = lines.next() => match next {
                Some(Ok(line)) => {
                    idle.touch();
                    server.dispatch(&session, &line).await;
                }
                Some(Err(e)) => break Err(ChatError::from(e)),
                None => {
                    debug!("Session {} reached end of stream", session.id());
                    break Ok(());
                }
            }
        }
    };

    if let Err(e) = &result {
        warn!("Read from session {} failed: {}", session.id(), e);
    }

    server.offline(&session).await;
    if idle.join().await == IdleState::Evicted {
        debug!("Session {} ended by idle timeout", session.id());
    }
    let _ = write_task.await;

    info!("Session {} disconnected", session.id());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::message::{HELP, IDLE_TIMEOUT};
    use futures_util::SinkExt;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;
    use tokio_util::codec::Framed;

    type Client = Framed<DuplexStream, LinesCodec>;

    fn connect(
        server: &Arc<ChatServer>,
        peer: &str,
    ) -> (Client, JoinHandle<Result<(), ChatError>>) {
        let (client, remote) = tokio::io::duplex(4096);
        let task = tokio::spawn(serve(remote, peer.to_string(), Arc::clone(server)));
        (Framed::new(client, LinesCodec::new()), task)
    }

    async fn recv(client: &mut Client) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a line")
            .map(|r| r.unwrap())
    }

    /// Read until a line equal to `expected` arrives
    async fn expect_line(client: &mut Client, expected: &str) {
        loop {
            match recv(client).await {
                Some(line) if line == expected => return,
                Some(_) => continue,
                None => panic!("connection closed before {:?}", expected),
            }
        }
    }

    /// Consume the join traffic of a fresh connection
    ///
    /// The announcement goes through the bus, so it may land before or
    /// after the help lines.
    async fn joined(client: &mut Client, identity: &str) {
        let own = format!("[系统]{}:已上线", identity);
        let last_help = format!("[系统]{}", HELP[HELP.len() - 1]);
        let (mut seen_own, mut seen_help) = (false, false);
        while !seen_own || !seen_help {
            match recv(client).await {
                Some(line) if line == own => seen_own = true,
                Some(line) if line == last_help => seen_help = true,
                Some(_) => {}
                None => panic!("connection closed while joining"),
            }
        }
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let server = ChatServer::start(Config::default());
        let (mut c1, _t1) = connect(&server, "10.0.0.1:1111");
        joined(&mut c1, "10.0.0.1:1111").await;
        let (mut c2, _t2) = connect(&server, "10.0.0.2:2222");
        joined(&mut c2, "10.0.0.2:2222").await;
        expect_line(&mut c1, "[系统]10.0.0.2:2222:已上线").await;

        c1.send("who").await.unwrap();
        let mut listed = vec![recv(&mut c1).await.unwrap(), recv(&mut c1).await.unwrap()];
        listed.sort();
        assert_eq!(
            listed,
            vec!["[系统]10.0.0.1:1111:在线ing", "[系统]10.0.0.2:2222:在线ing"]
        );

        c1.send("rename|carol").await.unwrap();
        assert_eq!(recv(&mut c1).await.unwrap(), "[系统]您已修改用户名为：carol");
        assert!(server.registry().lookup("carol").await.is_ok());
        assert!(server.registry().lookup("10.0.0.1:1111").await.is_err());

        c2.send("to|carol|hi").await.unwrap();
        assert_eq!(recv(&mut c1).await.unwrap(), "[私聊]10.0.0.2:2222对您说：hi");
    }

    #[tokio::test]
    async fn test_hall_chat_over_the_wire() {
        let server = ChatServer::start(Config::default());
        let (mut c1, _t1) = connect(&server, "alice");
        joined(&mut c1, "alice").await;
        let (mut c2, _t2) = connect(&server, "bob");
        joined(&mut c2, "bob").await;

        // CRLF terminators are accepted too
        c1.get_mut().write_all(b"hello\r\n").await.unwrap();
        expect_line(&mut c2, "[大厅]alice:hello").await;
        expect_line(&mut c1, "[大厅]alice:hello").await;
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_and_announces() {
        let server = ChatServer::start(Config::default());
        let (mut c1, _t1) = connect(&server, "alice");
        joined(&mut c1, "alice").await;
        let (mut c2, t2) = connect(&server, "bob");
        joined(&mut c2, "bob").await;

        drop(c2);
        t2.await.unwrap().unwrap();

        expect_line(&mut c1, "[系统]bob:已下线").await;
        assert!(server.registry().lookup("bob").await.is_err());
        assert_eq!(server.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_oversize_line_ends_session() {
        let config = Config {
            max_line_length: 16,
            ..Config::default()
        };
        let server = ChatServer::start(config);
        let (mut c1, t1) = connect(&server, "alice");
        joined(&mut c1, "alice").await;

        c1.send("x".repeat(64)).await.unwrap();

        assert!(matches!(t1.await.unwrap(), Err(ChatError::Codec(_))));
        assert!(server.registry().is_empty().await);
        assert!(recv(&mut c1).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_is_evicted() {
        let server = ChatServer::start(Config::default());
        let (mut c1, t1) = connect(&server, "alice");
        joined(&mut c1, "alice").await;

        tokio::time::advance(Duration::from_secs(299)).await;
        c1.send("still here").await.unwrap();
        expect_line(&mut c1, "[大厅]alice:still here").await;

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(server.registry().lookup("alice").await.is_ok());

        expect_line(&mut c1, &format!("[系统]{}", IDLE_TIMEOUT)).await;
        assert!(recv(&mut c1).await.is_none());
        t1.await.unwrap().unwrap();
        assert!(server.registry().is_empty().await);
    }
}
