//! WebSocket notification channel
//!
//! Real-time notifications arrive over `/ws/notifications`. The stream
//! runs in a background task that reconnects with exponential backoff
//! whenever the connection drops, re-reading the current access token on
//! every attempt so a reconnect after a refresh picks up the new token.

use crate::types::Notification;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Events emitted by the notification stream
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    /// The connection (or a reconnection) is established
    Connected,
    /// A notification arrived
    Notification(Notification),
    /// The connection dropped; a reconnect attempt follows
    Disconnected,
}

/// Supplies the current access token for each connection attempt
///
/// Returning `None` skips the attempt and retries after the backoff
/// delay, which covers the window where a refresh is in flight.
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Configuration for the notification stream
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket base URL (e.g., `wss://api.opswatch.example`)
    pub base_url: String,
    /// Initial reconnect delay
    pub initial_delay: Duration,
    /// Maximum reconnect delay
    pub max_delay: Duration,
    /// Backoff multiplier between attempts
    pub backoff_multiplier: f64,
    /// Buffer size of the event channel
    pub channel_capacity: usize,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            base_url: "wss://api.opswatch.example".to_string(),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            channel_capacity: 64,
        }
    }
}

impl WsConfig {
    /// Create a config for the given WebSocket base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the reconnect backoff parameters
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Build the connection URL with the token as a query parameter
    pub(crate) fn connect_url(&self, token: &str) -> String {
        format!(
            "{}/ws/notifications?token={}",
            self.base_url.trim_end_matches('/'),
            token
        )
    }

    /// Delay before the given reconnect attempt (0-based)
    pub(crate) fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Handle to a running notification stream
///
/// [`close`](NotificationStream::close) performs a clean shutdown (a
/// Close frame goes out before the connection drops); merely dropping
/// the handle aborts the task instead.
pub struct NotificationStream {
    events: mpsc::Receiver<WsEvent>,
    shutdown: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl NotificationStream {
    /// Connect and start streaming notifications
    ///
    /// The task runs until [`close`](Self::close) is called or the handle
    /// is dropped; connection failures are retried with backoff rather
    /// than surfaced as errors.
    pub fn connect(config: WsConfig, token_provider: TokenProvider) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(run_stream(config, token_provider, tx, shutdown_rx));

        Self {
            events: rx,
            shutdown,
            task: Some(task),
        }
    }

    /// Receive the next event
    ///
    /// Returns `None` once the stream is closed.
    pub async fn next_event(&mut self) -> Option<WsEvent> {
        self.events.recv().await
    }

    /// Stop the stream cleanly
    ///
    /// A Close frame is sent on any live connection before the task
    /// shuts down.
    pub async fn close(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for NotificationStream {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Why the message pump stopped
#[derive(Debug, PartialEq, Eq)]
enum PumpOutcome {
    /// The connection dropped or the server closed it
    Disconnected,
    /// Shutdown was requested; a Close frame has been sent
    Shutdown,
}

/// Resolves once shutdown is requested (or the handle is gone)
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow_and_update() {
        return;
    }
    let _ = rx.changed().await;
}

/// Connection loop: connect, pump messages, back off, repeat
async fn run_stream(
    config: WsConfig,
    token_provider: TokenProvider,
    tx: mpsc::Sender<WsEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;

    loop {
        let Some(token) = token_provider() else {
            tracing::debug!("no access token for notification stream, waiting");
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => return,
                _ = tokio::time::sleep(config.delay_for_attempt(attempt)) => {}
            }
            attempt = attempt.saturating_add(1);
            continue;
        };

        let url = config.connect_url(&token);

        let connected = tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => return,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((stream, _response)) => {
                tracing::info!("notification stream connected");
                attempt = 0;

                if tx.send(WsEvent::Connected).await.is_err() {
                    return;
                }

                match pump_messages(stream, &tx, &mut shutdown).await {
                    PumpOutcome::Shutdown => return,
                    PumpOutcome::Disconnected => {
                        if tx.send(WsEvent::Disconnected).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!("notification stream connect failed: {}", e);
            }
        }

        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown) => return,
            _ = tokio::time::sleep(config.delay_for_attempt(attempt)) => {}
        }
        attempt = attempt.saturating_add(1);
    }
}

/// Forward incoming frames until the connection drops or shutdown hits
async fn pump_messages<S>(
    mut stream: S,
    tx: &mpsc::Sender<WsEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> PumpOutcome
where
    S: StreamExt<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
        + SinkExt<Message>
        + Unpin,
{
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => {
                let _ = stream.send(Message::Close(None)).await;
                return PumpOutcome::Shutdown;
            }
            message = stream.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => match parse_notification(&text) {
                Some(notification) => {
                    if tx.send(WsEvent::Notification(notification)).await.is_err() {
                        return PumpOutcome::Disconnected;
                    }
                }
                None => {
                    tracing::debug!("ignoring unparseable notification frame");
                }
            },
            Some(Ok(Message::Ping(payload))) => {
                if stream.send(Message::Pong(payload)).await.is_err() {
                    return PumpOutcome::Disconnected;
                }
            }
            Some(Ok(Message::Close(_))) => {
                tracing::debug!("notification stream closed by server");
                return PumpOutcome::Disconnected;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::warn!("notification stream error: {}", e);
                return PumpOutcome::Disconnected;
            }
            None => return PumpOutcome::Disconnected,
        }
    }
}

/// Parse a text frame into a notification
///
/// Frames that aren't notifications (or use a shape from a newer server)
/// are dropped rather than killing the connection.
fn parse_notification(text: &str) -> Option<Notification> {
    serde_json::from_str(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NotificationKind, Severity};
    use futures_util::{Sink, Stream};
    use std::collections::VecDeque;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};
    use tokio_tungstenite::tungstenite::Error as TungsteniteError;

    /// In-memory socket standing in for a server connection
    struct FakeSocket {
        incoming: VecDeque<Result<Message, TungsteniteError>>,
        sent: Arc<Mutex<Vec<Message>>>,
    }

    impl FakeSocket {
        fn new(
            incoming: Vec<Result<Message, TungsteniteError>>,
        ) -> (Self, Arc<Mutex<Vec<Message>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    incoming: incoming.into(),
                    sent: sent.clone(),
                },
                sent,
            )
        }
    }

    impl Stream for FakeSocket {
        type Item = Result<Message, TungsteniteError>;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Ready(self.incoming.pop_front())
        }
    }

    impl Sink<Message> for FakeSocket {
        type Error = TungsteniteError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
            self.sent.lock().unwrap().push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn notification_frame() -> String {
        r#"{
            "id": "ntf_1",
            "type": "incident-created",
            "severity": "critical",
            "message": "New incident",
            "incidentId": "inc_9",
            "read": false,
            "createdAt": "2025-03-01T12:00:00Z"
        }"#
        .to_string()
    }

    async fn run_pump(
        incoming: Vec<Result<Message, TungsteniteError>>,
        shutdown_now: bool,
    ) -> (PumpOutcome, Vec<WsEvent>, Vec<Message>) {
        let (socket, sent) = FakeSocket::new(incoming);
        let (tx, mut rx) = mpsc::channel(16);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(shutdown_now);

        let outcome = pump_messages(socket, &tx, &mut shutdown_rx).await;
        drop(shutdown_tx);
        drop(tx);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        let sent = sent.lock().unwrap().clone();
        (outcome, events, sent)
    }

    #[test]
    fn test_connect_url_carries_token() {
        let config = WsConfig::new("wss://api.opswatch.example");
        assert_eq!(
            config.connect_url("tok_123"),
            "wss://api.opswatch.example/ws/notifications?token=tok_123"
        );
    }

    #[test]
    fn test_connect_url_trims_trailing_slash() {
        let config = WsConfig::new("wss://api.opswatch.example/");
        assert_eq!(
            config.connect_url("t"),
            "wss://api.opswatch.example/ws/notifications?token=t"
        );
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = WsConfig::new("wss://example.com").with_backoff(
            Duration::from_secs(1),
            Duration::from_secs(10),
            2.0,
        );

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn test_parse_notification_frame() {
        let notification = parse_notification(&notification_frame()).unwrap();
        assert_eq!(notification.kind, NotificationKind::IncidentCreated);
        assert_eq!(notification.severity, Severity::Critical);
    }

    #[test]
    fn test_non_notification_frame_is_dropped() {
        assert!(parse_notification("{\"hello\": \"world\"}").is_none());
        assert!(parse_notification("not json").is_none());
    }

    #[test]
    fn test_token_provider_none_is_allowed() {
        let provider: TokenProvider = Arc::new(|| None);
        assert!(provider().is_none());
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        let incoming = vec![Ok(Message::Ping(b"heartbeat".to_vec()))];

        let (outcome, events, sent) = run_pump(incoming, false).await;

        assert_eq!(outcome, PumpOutcome::Disconnected);
        assert!(events.is_empty());
        assert_eq!(sent, vec![Message::Pong(b"heartbeat".to_vec())]);
    }

    #[tokio::test]
    async fn test_bad_frame_does_not_kill_the_connection() {
        let incoming = vec![
            Ok(Message::Text("not json".to_string())),
            Ok(Message::Text(notification_frame())),
        ];

        let (outcome, events, _sent) = run_pump(incoming, false).await;

        assert_eq!(outcome, PumpOutcome::Disconnected);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], WsEvent::Notification(n) if n.id == "ntf_1"));
    }

    #[tokio::test]
    async fn test_server_close_frame_stops_the_pump() {
        let incoming = vec![
            Ok(Message::Close(None)),
            Ok(Message::Text(notification_frame())),
        ];

        let (outcome, events, _sent) = run_pump(incoming, false).await;

        assert_eq!(outcome, PumpOutcome::Disconnected);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_protocol_error_stops_the_pump() {
        let incoming = vec![Err(TungsteniteError::ConnectionClosed)];

        let (outcome, events, _sent) = run_pump(incoming, false).await;

        assert_eq!(outcome, PumpOutcome::Disconnected);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_sends_close_frame() {
        let incoming = vec![Ok(Message::Text(notification_frame()))];

        let (outcome, events, sent) = run_pump(incoming, true).await;

        assert_eq!(outcome, PumpOutcome::Shutdown);
        assert!(events.is_empty());
        assert_eq!(sent, vec![Message::Close(None)]);
    }
}
