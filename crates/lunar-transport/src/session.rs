//! Duplex session with automatic reconnection and request correlation.
//!
//! A [`ConnectionManager`] owns one link at a time and one background task
//! driving it. The task:
//!
//! - writes queued outbound payloads,
//! - answers pings the transport does not answer itself,
//! - routes every inbound text frame: frames whose `echo.request_id` matches
//!   a pending request resolve that request, everything else goes to the
//!   inbound queue read through [`receive`](ConnectionManager::receive),
//! - reconnects with backoff when the link drops unexpectedly.
//!
//! Awaiting sends register a oneshot under a fresh UUID before the request
//! is written, so a response can never overtake its registration. There is
//! no global send lock; concurrent calls only share the pending map.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt, stream};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use lunar_core::{
    ApiError, ApiResult, DecodeError, DecodeResult, TransportError, TransportResult,
};

use crate::connector::{Connector, Frame, Link};
use crate::queue::InboundQueue;
use crate::retry::RetryPolicy;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Closing => "closing",
        })
    }
}

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for awaiting sends.
    pub request_timeout: Duration,
    /// Backoff between connection attempts.
    pub retry: RetryPolicy,
    /// How long `close` waits for the background task before aborting it.
    pub close_grace: Duration,
    /// Capacity of the outbound write queue.
    pub outbound_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            close_grace: Duration::from_secs(2),
            outbound_capacity: 256,
        }
    }
}

type PendingMap = HashMap<String, oneshot::Sender<ApiResult<Value>>>;

struct Shared {
    connector: Arc<dyn Connector>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    pending: Mutex<PendingMap>,
    outbound: Mutex<Option<mpsc::Sender<String>>>,
    queue: InboundQueue,
    shutdown: CancellationToken,
}

struct Reader {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the transport session.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    reader: Mutex<Option<Reader>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                config,
                state: Mutex::new(SessionState::Disconnected),
                pending: Mutex::new(HashMap::new()),
                outbound: Mutex::new(None),
                queue: InboundQueue::default(),
                shutdown: CancellationToken::new(),
            }),
            reader: Mutex::new(None),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Number of requests awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Number of inbound frames not yet consumed.
    pub fn queued_count(&self) -> usize {
        self.shared.queue.len()
    }

    /// Establishes the link and starts the background task.
    ///
    /// An initial connect (`is_reconnect == false`) gives up after
    /// `retry.max_retries` attempts. A reconnect retries until the session is
    /// closed. A task left over from an earlier link is cancelled and awaited
    /// first, so at most one reader runs per session.
    pub async fn connect(&self, is_reconnect: bool) -> TransportResult<()> {
        if self.shared.shutdown.is_cancelled() {
            return Err(TransportError::ConnectionClosed {
                reason: "session is closed".into(),
            });
        }

        self.stop_reader().await;

        let cancel = self.shared.shutdown.child_token();
        let link = match self.shared.establish(is_reconnect, &cancel).await {
            Ok(link) => link,
            Err(e) => {
                self.shared.set_state(SessionState::Disconnected);
                return Err(e);
            }
        };

        let (tx, rx) = mpsc::channel(self.shared.config.outbound_capacity);
        *self.shared.outbound.lock() = Some(tx);
        self.shared.set_state(SessionState::Connected);

        let handle = tokio::spawn(self.shared.clone().drive(link, rx, cancel.clone()));
        *self.reader.lock() = Some(Reader { cancel, handle });
        Ok(())
    }

    /// Sends an action.
    ///
    /// With `await_response`, the request is tagged with a fresh
    /// `echo.request_id` and the call suspends until the matching response,
    /// the request timeout, or session teardown. Returns the response `data`.
    /// Without it, returns `None` once the request is queued for writing.
    pub async fn send(
        &self,
        action: &str,
        params: Value,
        await_response: bool,
    ) -> ApiResult<Option<Value>> {
        let outbound = self.shared.outbound()?;
        let mut envelope = json!({ "action": action, "params": params });

        if !await_response {
            let payload = serde_json::to_string(&envelope)?;
            outbound
                .send(payload)
                .await
                .map_err(|_| self.shared.write_failed())?;
            trace!(action, "Pushed request");
            return Ok(None);
        }

        let request_id = Uuid::new_v4().to_string();
        envelope["echo"] = json!({ "request_id": request_id });
        let payload = serde_json::to_string(&envelope)?;

        let (tx, rx) = oneshot::channel();
        let guard = PendingGuard::register(&self.shared, request_id, tx);
        debug!(action, request_id = %guard.id, "Calling API");

        if outbound.send(payload).await.is_err() {
            return Err(self.shared.write_failed());
        }

        match timeout(self.shared.config.request_timeout, rx).await {
            Ok(Ok(result)) => result.map(Some),
            Ok(Err(_)) => Err(ApiError::ConnectionClosed),
            Err(_) => {
                warn!(action, request_id = %guard.id, "API call timed out");
                Err(ApiError::Timeout)
            }
        }
    }

    /// Calls an action and waits for its response data.
    pub async fn call(&self, action: &str, params: Value) -> ApiResult<Value> {
        self.send(action, params, true)
            .await
            .map(Option::unwrap_or_default)
    }

    /// Sends an action without waiting for a response.
    pub async fn push(&self, action: &str, params: Value) -> ApiResult<()> {
        self.send(action, params, false).await.map(|_| ())
    }

    /// Inbound frames that were not responses, in arrival order.
    ///
    /// Ends after [`close`](Self::close). Meant for a single consumer.
    pub fn receive(&self) -> impl Stream<Item = Value> + Send + 'static {
        stream::unfold(self.shared.clone(), |shared| async move {
            shared.queue.pop().await.map(|frame| (frame, shared))
        })
    }

    /// Tears the session down.
    ///
    /// Cancels the background task (bounded wait, then abort), fails every
    /// pending request with [`ApiError::ConnectionClosed`], and ends the
    /// inbound stream after discarding unconsumed frames. Idempotent.
    pub async fn close(&self) {
        self.shared.set_state(SessionState::Closing);
        self.shared.shutdown.cancel();

        self.stop_reader().await;
        self.shared.outbound.lock().take();

        let failed = self.shared.fail_pending();
        let dropped = self.shared.queue.close();
        self.shared.set_state(SessionState::Disconnected);

        info!(
            endpoint = self.shared.connector.endpoint(),
            failed_requests = failed,
            dropped_frames = dropped,
            "Session closed"
        );
    }

    async fn stop_reader(&self) {
        let Some(reader) = self.reader.lock().take() else {
            return;
        };
        reader.cancel.cancel();

        let mut handle = reader.handle;
        if timeout(self.shared.config.close_grace, &mut handle)
            .await
            .is_err()
        {
            warn!("Session task did not stop in time, aborting");
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

impl Shared {
    fn set_state(&self, state: SessionState) {
        let mut current = self.state.lock();
        if *current != state {
            trace!(from = %*current, to = %state, "Session state changed");
            *current = state;
        }
    }

    fn is_closing(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Error for a write whose link went away under it.
    fn write_failed(&self) -> ApiError {
        if self.is_closing() {
            ApiError::ConnectionClosed
        } else {
            ApiError::NotConnected
        }
    }

    fn outbound(&self) -> ApiResult<mpsc::Sender<String>> {
        if *self.state.lock() != SessionState::Connected {
            return Err(ApiError::NotConnected);
        }
        self.outbound.lock().clone().ok_or(ApiError::NotConnected)
    }

    fn fail_pending(&self) -> usize {
        let drained: Vec<_> = self.pending.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(ApiError::ConnectionClosed));
        }
        if count > 0 {
            debug!(count, "Failed pending requests");
        }
        count
    }

    /// Opens a link, retrying with backoff.
    async fn establish(
        &self,
        is_reconnect: bool,
        cancel: &CancellationToken,
    ) -> TransportResult<Link> {
        let policy = &self.config.retry;
        let endpoint = self.connector.endpoint();
        let mut failures = 0u32;

        self.set_state(SessionState::Connecting);
        loop {
            let attempt = tokio::select! {
                result = self.connector.connect() => result,
                _ = cancel.cancelled() => return Err(closing_error()),
            };

            let reason = match attempt {
                Ok(link) => {
                    info!(endpoint, reconnect = is_reconnect, "Connected");
                    return Ok(link);
                }
                Err(e) => e.to_string(),
            };

            failures = failures.saturating_add(1);
            if !is_reconnect && failures >= policy.max_retries {
                error!(endpoint, attempts = failures, error = %reason, "Giving up connecting");
                return Err(TransportError::RetriesExhausted {
                    url: endpoint.to_string(),
                    attempts: failures,
                    reason,
                });
            }

            let delay = policy.delay_for(failures);
            warn!(endpoint, attempt = failures, ?delay, error = %reason, "Connection attempt failed, retrying");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(closing_error()),
            }
        }
    }

    /// Background task for one session. Survives reconnects.
    async fn drive(
        self: Arc<Self>,
        mut link: Link,
        mut outbound: mpsc::Receiver<String>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    let _ = link.sink.close().await;
                    break;
                }

                Some(payload) = outbound.recv() => {
                    if let Err(e) = link.sink.send(Frame::Text(payload)).await {
                        warn!(error = %e, "Failed to write frame");
                    }
                }

                frame = link.stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.route(&text),
                    Some(Ok(Frame::Ping(data))) => {
                        if self.connector.answers_pings() {
                            trace!("Received ping");
                        } else {
                            trace!("Received ping, sending pong");
                            let _ = link.sink.send(Frame::Pong(data)).await;
                        }
                    }
                    Some(Ok(Frame::Pong(_))) => trace!("Received pong"),
                    Some(Ok(Frame::Close)) | Some(Err(_)) | None => {
                        match frame {
                            Some(Err(e)) => warn!(error = %e, "Link failed"),
                            _ => info!("Link closed by peer"),
                        }
                        match self.recover(&cancel).await {
                            Some(next) => link = next,
                            None => break,
                        }
                    }
                },
            }
        }
        trace!("Session task finished");
    }

    /// Reconnects after an unexpected drop. `None` when the session is closing.
    async fn recover(&self, cancel: &CancellationToken) -> Option<Link> {
        if self.is_closing() {
            self.queue.finish();
            return None;
        }

        let failed = self.fail_pending();
        if failed > 0 {
            warn!(failed, "Link dropped with requests in flight");
        }

        match self.establish(true, cancel).await {
            Ok(link) => {
                self.set_state(SessionState::Connected);
                Some(link)
            }
            Err(_) => {
                if self.is_closing() {
                    self.queue.finish();
                }
                None
            }
        }
    }

    fn route(&self, text: &str) {
        let frame = match decode_frame(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed frame");
                return;
            }
        };

        if let Some(id) = correlation_id(&frame) {
            let waiter = self.pending.lock().remove(id);
            if let Some(tx) = waiter {
                trace!(request_id = id, "Resolved pending request");
                let _ = tx.send(into_result(frame));
                return;
            }
            debug!(request_id = id, "Response for unknown request, queueing");
        }

        self.queue.push(frame);
    }
}

/// Removes its pending entry when the caller finishes or goes away.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: String,
}

impl<'a> PendingGuard<'a> {
    fn register(shared: &'a Shared, id: String, tx: oneshot::Sender<ApiResult<Value>>) -> Self {
        shared.pending.lock().insert(id.clone(), tx);
        Self { shared, id }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

fn closing_error() -> TransportError {
    TransportError::ConnectionClosed {
        reason: "session is closing".into(),
    }
}

fn decode_frame(text: &str) -> DecodeResult<Value> {
    let value: Value = serde_json::from_str(text)?;
    match value {
        Value::Object(_) => Ok(value),
        Value::Array(_) => Err(DecodeError::NotAnObject("array")),
        Value::String(_) => Err(DecodeError::NotAnObject("string")),
        Value::Number(_) => Err(DecodeError::NotAnObject("number")),
        Value::Bool(_) => Err(DecodeError::NotAnObject("bool")),
        Value::Null => Err(DecodeError::NotAnObject("null")),
    }
}

fn correlation_id(frame: &Value) -> Option<&str> {
    frame.get("echo")?.get("request_id")?.as_str()
}

/// Interprets a response frame: `data` on success, an error for `failed` or
/// `error` status.
fn into_result(mut frame: Value) -> ApiResult<Value> {
    let status = frame.get("status").and_then(Value::as_str).unwrap_or("ok");
    if matches!(status, "failed" | "error") {
        let retcode = frame.get("retcode").and_then(Value::as_i64).unwrap_or(-1);
        let message = ["message", "wording", "msg"]
            .iter()
            .find_map(|key| frame.get(*key).and_then(Value::as_str))
            .unwrap_or(status)
            .to_string();
        return Err(ApiError::Server { retcode, message });
    }
    Ok(frame
        .get_mut("data")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryAcceptor, MemoryConnector, MemoryPeer};
    use tokio_test::assert_ok;

    fn session(connector: &MemoryConnector) -> Arc<ConnectionManager> {
        Arc::new(ConnectionManager::new(
            Arc::new(connector.clone()),
            SessionConfig::default(),
        ))
    }

    async fn connected() -> (Arc<ConnectionManager>, MemoryConnector, MemoryAcceptor, MemoryPeer) {
        let (connector, mut acceptor) = MemoryConnector::pair();
        let session = session(&connector);
        assert_ok!(session.connect(false).await);
        let peer = acceptor.accept().await.unwrap();
        (session, connector, acceptor, peer)
    }

    fn request_id(payload: &str) -> String {
        let value: Value = serde_json::from_str(payload).unwrap();
        value["echo"]["request_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn concurrent_calls_resolve_with_their_own_response() {
        let (session, _connector, _acceptor, mut peer) = connected().await;

        let calls: Vec<_> = (0..3)
            .map(|n| {
                let session = session.clone();
                tokio::spawn(async move { session.call("get", json!({ "n": n })).await })
            })
            .collect();

        let mut requests = Vec::new();
        for _ in 0..3 {
            let payload = peer.next_text().await.unwrap();
            let value: Value = serde_json::from_str(&payload).unwrap();
            requests.push((value["params"]["n"].as_i64().unwrap(), request_id(&payload)));
        }
        assert_eq!(session.pending_count(), 3);

        // Answer in reverse arrival order.
        for (n, id) in requests.iter().rev() {
            peer.send_text(
                json!({ "status": "ok", "retcode": 0, "data": { "n": n }, "echo": { "request_id": id } })
                    .to_string(),
            );
        }

        for (n, call) in calls.into_iter().enumerate() {
            let data = call.await.unwrap().unwrap();
            assert_eq!(data["n"], n as i64);
        }
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_call_times_out_and_is_forgotten() {
        let (session, _connector, _acceptor, mut peer) = connected().await;

        let started = tokio::time::Instant::now();
        let call = {
            let session = session.clone();
            tokio::spawn(async move { session.call("slow", json!({})).await })
        };
        let _ = peer.next_text().await.unwrap();
        assert_eq!(session.pending_count(), 1);

        let result = call.await.unwrap();
        assert!(matches!(result, Err(ApiError::Timeout)));
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(session.pending_count(), 0);
    }

    #[tokio::test]
    async fn close_fails_every_pending_request_once() {
        let (session, _connector, _acceptor, mut peer) = connected().await;

        let calls: Vec<_> = (0..2)
            .map(|_| {
                let session = session.clone();
                tokio::spawn(async move { session.call("never", json!({})).await })
            })
            .collect();
        peer.next_text().await.unwrap();
        peer.next_text().await.unwrap();

        session.close().await;

        for call in calls {
            assert!(matches!(call.await.unwrap(), Err(ApiError::ConnectionClosed)));
        }
        assert_eq!(session.pending_count(), 0);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(
            session.call("after", json!({})).await,
            Err(ApiError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn events_and_unknown_responses_go_to_the_queue_in_order() {
        let (session, _connector, _acceptor, peer) = connected().await;
        let mut inbound = Box::pin(session.receive());

        peer.send_text(r#"{"post_type":"message","n":1}"#);
        peer.send_text("not json");
        peer.send_text("[1, 2]");
        peer.send_text(r#"{"status":"ok","echo":{"request_id":"stale"}}"#);
        peer.send_text(r#"{"post_type":"notice","n":2}"#);

        assert_eq!(inbound.next().await.unwrap()["n"], 1);
        assert_eq!(inbound.next().await.unwrap()["echo"]["request_id"], "stale");
        assert_eq!(inbound.next().await.unwrap()["n"], 2);

        session.close().await;
        assert!(inbound.next().await.is_none());
    }

    #[tokio::test]
    async fn failed_status_becomes_server_error() {
        let (session, _connector, _acceptor, mut peer) = connected().await;

        let call = {
            let session = session.clone();
            tokio::spawn(async move { session.call("send_group_msg", json!({})).await })
        };
        let id = request_id(&peer.next_text().await.unwrap());
        peer.send_text(
            json!({ "status": "failed", "retcode": 1404, "wording": "no such group", "echo": { "request_id": id } })
                .to_string(),
        );

        match call.await.unwrap() {
            Err(ApiError::Server { retcode, message }) => {
                assert_eq!(retcode, 1404);
                assert_eq!(message, "no such group");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[tokio::test]
    async fn push_carries_no_echo() {
        let (session, _connector, _acceptor, mut peer) = connected().await;

        assert_ok!(session.push("set_group_ban", json!({ "group_id": 1 })).await);
        let value: Value = serde_json::from_str(&peer.next_text().await.unwrap()).unwrap();
        assert_eq!(value["action"], "set_group_ban");
        assert!(value.get("echo").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn initial_connect_gives_up_after_max_retries() {
        let (connector, _acceptor) = MemoryConnector::pair();
        connector.refuse_next(u32::MAX);
        let session = session(&connector);

        let err = session.connect(false).await.unwrap_err();
        assert!(matches!(err, TransportError::RetriesExhausted { attempts: 5, .. }));
        assert_eq!(connector.attempts(), 5);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_drop_and_keeps_queued_frames() {
        let (session, connector, mut acceptor, peer) = connected().await;

        peer.send_text(r#"{"post_type":"meta_event","n":1}"#);
        connector.refuse_next(2);
        peer.disconnect();

        let mut next_peer = acceptor.accept().await.unwrap();
        assert_eq!(connector.attempts(), 4);

        // The session flips to connected right after the link is handed over.
        while !session.is_connected() {
            tokio::task::yield_now().await;
        }

        let call = {
            let session = session.clone();
            tokio::spawn(async move { session.call("ping", json!({})).await })
        };
        let id = request_id(&next_peer.next_text().await.unwrap());
        next_peer.send_text(json!({ "status": "ok", "data": "pong", "echo": { "request_id": id } }).to_string());
        assert_eq!(call.await.unwrap().unwrap(), "pong");

        let mut inbound = Box::pin(session.receive());
        assert_eq!(inbound.next().await.unwrap()["n"], 1);
    }

    #[tokio::test]
    async fn pings_are_answered_unless_the_transport_does() {
        let (_session, _connector, _acceptor, mut peer) = connected().await;
        peer.outgoing.unbounded_send(Ok(Frame::Ping(vec![7]))).unwrap();
        assert_eq!(peer.incoming.next().await, Some(Frame::Pong(vec![7])));

        /// Memory link whose transport claims to answer pings itself.
        struct SelfAnswering(MemoryConnector);

        #[async_trait::async_trait]
        impl Connector for SelfAnswering {
            async fn connect(&self) -> TransportResult<Link> {
                self.0.connect().await
            }

            fn endpoint(&self) -> &str {
                self.0.endpoint()
            }

            fn answers_pings(&self) -> bool {
                true
            }
        }

        let (connector, mut acceptor) = MemoryConnector::pair();
        let session = ConnectionManager::new(
            Arc::new(SelfAnswering(connector)),
            SessionConfig::default(),
        );
        assert_ok!(session.connect(false).await);
        let mut peer = acceptor.accept().await.unwrap();
        let mut inbound = Box::pin(session.receive());

        peer.outgoing.unbounded_send(Ok(Frame::Ping(vec![7]))).unwrap();
        peer.send_text(r#"{"post_type":"meta_event","n":1}"#);
        assert_eq!(inbound.next().await.unwrap()["n"], 1);

        assert_ok!(session.push("after_ping", json!({})).await);
        let frame = peer.incoming.next().await.unwrap();
        assert!(matches!(frame, Frame::Text(text) if text.contains("after_ping")));
    }

    /// Takes one frame, then never finishes writing it.
    #[derive(Default)]
    struct StalledConnector {
        parked: Mutex<Vec<futures::channel::mpsc::Receiver<Frame>>>,
    }

    #[async_trait::async_trait]
    impl Connector for StalledConnector {
        async fn connect(&self) -> TransportResult<Link> {
            let (tx, rx) = futures::channel::mpsc::channel(0);
            self.parked.lock().push(rx);
            let sink = tx.sink_map_err(|e| TransportError::SendFailed(e.to_string()));
            Ok(Link::new(
                Box::pin(sink),
                Box::pin(stream::pending::<TransportResult<Frame>>()),
            ))
        }

        fn endpoint(&self) -> &str {
            "stalled://"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn writes_cut_off_by_close_report_connection_closed() {
        let config = SessionConfig {
            outbound_capacity: 1,
            ..SessionConfig::default()
        };
        let session = Arc::new(ConnectionManager::new(
            Arc::new(StalledConnector::default()),
            config,
        ));
        assert_ok!(session.connect(false).await);

        // One payload stalls in the link, one fills the queue, one waits.
        let pushes: Vec<_> = (0..3)
            .map(|n| {
                let session = session.clone();
                tokio::spawn(async move { session.push("stalled", json!({ "n": n })).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(10)).await;

        session.close().await;

        let mut closed = 0;
        for push in pushes {
            match push.await.unwrap() {
                Ok(()) => {}
                Err(ApiError::ConnectionClosed) => closed += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(closed, 1);
    }
}
