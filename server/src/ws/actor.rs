use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};

use crate::state::{AppState, Keepalive};
use crate::ws::protocol;
use crate::ws::ClientHandle;

/// How long the writer gets to flush the final Close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Close code for a payload that is not a valid book event.
const CLOSE_INVALID_PAYLOAD: u16 = 1007;

/// Close code for a peer that stopped answering pings.
const CLOSE_GOING_AWAY: u16 = 1001;

/// Why the reader loop ended.
#[derive(Debug)]
enum Exit {
    /// Client closed, errored, or the stream ended.
    Disconnected,
    /// Client sent a payload that does not decode as a book event.
    Malformed(String),
    /// Client stopped answering keepalive pings.
    Unresponsive,
}

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards frames from the client's outbox
/// - Reader loop: decodes inbound book events and hands them to the notifier
///
/// The outbox sender lives in the [`ClientHandle`] registered with the
/// connection registry, so the delivery loop can reach this client.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: i64) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let handle = ClientHandle::new(tx.clone());
    let conn_id = handle.id();
    state.connections.register(handle);

    tracing::info!(
        connection = %conn_id,
        user_id,
        clients = state.connections.len(),
        "WebSocket client connected"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Pong signals for the ping task, and its verdict on a silent peer.
    // Without keepalive the sender is dropped and that branch never fires.
    let (pong_tx, pong_rx) = mpsc::unbounded_channel::<()>();
    let (unresponsive_tx, mut unresponsive_rx) = oneshot::channel::<()>();
    let ping_handle = state.keepalive.map(|keepalive| {
        tokio::spawn(ping_task(tx.clone(), pong_rx, unresponsive_tx, keepalive))
    });

    let exit = loop {
        let next = tokio::select! {
            next = ws_receiver.next() => next,
            Ok(()) = &mut unresponsive_rx => break Exit::Unresponsive,
        };
        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    if let Err(reason) = forward_event(&state, text.as_str().as_bytes()).await {
                        break Exit::Malformed(reason);
                    }
                }
                Message::Binary(data) => {
                    if let Err(reason) = forward_event(&state, &data).await {
                        break Exit::Malformed(reason);
                    }
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::debug!(connection = %conn_id, reason = ?frame, "Client initiated close");
                    break Exit::Disconnected;
                }
            },
            Some(Err(e)) => {
                tracing::debug!(connection = %conn_id, error = %e, "WebSocket receive error");
                break Exit::Disconnected;
            }
            None => break Exit::Disconnected,
        }
    };

    if let Some(ping) = ping_handle {
        ping.abort();
    }

    // Deregister before the outbox closes so the delivery loop stops
    // targeting this client.
    state.connections.deregister(conn_id);

    match &exit {
        Exit::Malformed(reason) => {
            tracing::warn!(
                connection = %conn_id,
                user_id,
                error = %reason,
                "Malformed payload, closing connection"
            );
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: CLOSE_INVALID_PAYLOAD,
                reason: "invalid book event".into(),
            })));
        }
        Exit::Unresponsive => {
            tracing::warn!(connection = %conn_id, user_id, "Pong timeout, closing connection");
        }
        Exit::Disconnected => {}
    }

    // Dropping the last sender lets the writer drain and exit
    drop(tx);
    let mut writer_handle = writer_handle;
    if timeout(CLOSE_GRACE, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }

    tracing::info!(
        connection = %conn_id,
        user_id,
        clients = state.connections.len(),
        "WebSocket client disconnected"
    );
}

/// Decode one inbound frame and publish it. Returns the decode error text
/// when the payload is not a book event.
async fn forward_event(state: &AppState, payload: &[u8]) -> Result<(), String> {
    let event = protocol::decode_event(payload).map_err(|e| e.to_string())?;
    tracing::debug!(book_id = event.id, "Book event received from client");
    state.notifier.notify(event).await;
    Ok(())
}

/// Writer task: receives frames from the outbox and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        let closing = matches!(msg, Message::Close(_));
        if ws_sender.send(msg).await.is_err() || closing {
            break;
        }
    }
}

/// Ping task: sends periodic pings. If a pong does not arrive in time it
/// queues a Close frame and tells the reader loop to stop.
async fn ping_task(
    tx: mpsc::UnboundedSender<Message>,
    mut pong_rx: mpsc::UnboundedReceiver<()>,
    unresponsive: oneshot::Sender<()>,
    keepalive: Keepalive,
) {
    let mut ping_timer = interval(keepalive.interval);
    // Skip the first immediate tick
    ping_timer.tick().await;

    loop {
        ping_timer.tick().await;

        // Unsolicited pongs must not answer the next ping
        while pong_rx.try_recv().is_ok() {}

        if tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
            // Writer is gone
            break;
        }

        match timeout(keepalive.pong_timeout, pong_rx.recv()).await {
            Ok(Some(())) => {}
            _ => {
                let _ = tx.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_GOING_AWAY,
                    reason: "Pong timeout".into(),
                })));
                let _ = unresponsive.send(());
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot::error::TryRecvError;

    fn keepalive() -> Keepalive {
        Keepalive {
            interval: Duration::from_millis(50),
            pong_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_stale_pongs_do_not_answer_a_ping() {
        let (tx, mut outbox) = mpsc::unbounded_channel();
        let (pong_tx, pong_rx) = mpsc::unbounded_channel();
        let (gone_tx, gone_rx) = oneshot::channel();

        // Pongs that arrive before any ping was sent
        for _ in 0..3 {
            pong_tx.send(()).unwrap();
        }
        tokio::spawn(ping_task(tx, pong_rx, gone_tx, keepalive()));

        timeout(Duration::from_secs(2), gone_rx)
            .await
            .expect("peer declared unresponsive")
            .unwrap();

        assert!(matches!(outbox.recv().await, Some(Message::Ping(_))));
        match outbox.recv().await {
            Some(Message::Close(Some(frame))) => assert_eq!(frame.code, CLOSE_GOING_AWAY),
            other => panic!("expected a close frame, got {:?}", other),
        }
        drop(pong_tx);
    }

    #[tokio::test]
    async fn test_answered_pings_keep_the_peer() {
        let (tx, mut outbox) = mpsc::unbounded_channel();
        let (pong_tx, pong_rx) = mpsc::unbounded_channel();
        let (gone_tx, mut gone_rx) = oneshot::channel();

        let pinger = tokio::spawn(ping_task(tx, pong_rx, gone_tx, keepalive()));
        tokio::spawn(async move {
            while let Some(msg) = outbox.recv().await {
                if let Message::Ping(_) = msg {
                    let _ = pong_tx.send(());
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(gone_rx.try_recv(), Err(TryRecvError::Empty));
        pinger.abort();
    }
}
