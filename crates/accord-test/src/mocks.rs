//! Mock transports for the gateway and the REST rate limiter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use accord_gateway::{Connection, Frame, FrameSink, FrameStream, GatewayError, GatewayResult, Transport};
use accord_ratelimit::{
    HttpTransport, RateLimitError, RateLimitResult, RequestContext, RestRequest, RestResponse,
};

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// In-process gateway transport.
///
/// Every successful `connect` hands the server side of the new
/// connection to the paired [`MockServer`], so a test can play Discord
/// step by step.
#[derive(Debug, Clone)]
pub struct MockGateway {
    accepted: mpsc::UnboundedSender<ServerConnection>,
    urls: Arc<Mutex<Vec<String>>>,
    refuse: Arc<AtomicU32>,
}

impl MockGateway {
    /// Create a transport and its server end.
    #[must_use]
    pub fn new() -> (Self, MockServer) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        let gateway = Self {
            accepted,
            urls: Arc::new(Mutex::new(Vec::new())),
            refuse: Arc::new(AtomicU32::new(0)),
        };
        (gateway, MockServer { incoming })
    }

    /// Fail the next `count` connection attempts.
    pub fn refuse_next(&self, count: u32) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// Every URL passed to `connect`, including refused attempts.
    #[must_use]
    pub fn connected_urls(&self) -> Vec<String> {
        self.urls.lock().map(|urls| urls.clone()).unwrap_or_default()
    }

    /// Number of `connect` calls so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.urls.lock().map(|urls| urls.len()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockGateway {
    async fn connect(&self, url: &str) -> GatewayResult<Connection> {
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_owned());
        }

        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(GatewayError::Transport("connection refused".into()));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let server = ServerConnection {
            url: url.to_owned(),
            to_client,
            from_client,
        };
        self.accepted
            .send(server)
            .map_err(|_| GatewayError::Transport("mock server dropped".into()))?;

        Ok(Connection {
            sink: Box::new(MockSink { tx: client_tx }),
            stream: Box::new(MockStream { rx: client_rx }),
        })
    }
}

struct MockSink {
    tx: mpsc::UnboundedSender<Frame>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, frame: Frame) -> GatewayResult<()> {
        self.tx
            .send(frame)
            .map_err(|_| GatewayError::Transport("server hung up".into()))
    }
}

struct MockStream {
    rx: mpsc::UnboundedReceiver<GatewayResult<Frame>>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn recv(&mut self) -> Option<GatewayResult<Frame>> {
        self.rx.recv().await
    }
}

/// Accepts connections made through a [`MockGateway`].
#[derive(Debug)]
pub struct MockServer {
    incoming: mpsc::UnboundedReceiver<ServerConnection>,
}

impl MockServer {
    /// Wait for the next connection. `None` once the gateway is dropped.
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.incoming.recv().await
    }

    /// [`accept`](Self::accept) with a deadline.
    pub async fn accept_within(&mut self, timeout: Duration) -> Option<ServerConnection> {
        tokio::time::timeout(timeout, self.accept()).await.ok().flatten()
    }
}

/// The server side of one mock connection.
#[derive(Debug)]
pub struct ServerConnection {
    url: String,
    to_client: mpsc::UnboundedSender<GatewayResult<Frame>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl ServerConnection {
    /// The URL the client connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a frame to the client. Returns `false` if it is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.to_client.send(Ok(frame)).is_ok()
    }

    /// Send a text frame.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Frame::Text(text.into()))
    }

    /// Send a close frame.
    pub fn close(&self, code: u16) -> bool {
        self.send(Frame::close(code))
    }

    /// Deliver a read error to the client.
    pub fn fail(&self, message: &str) -> bool {
        self.to_client
            .send(Err(GatewayError::Transport(message.to_owned())))
            .is_ok()
    }

    /// Next frame from the client, `None` once its writer is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Next client payload with opcode `op`, skipping all others.
    ///
    /// Returns `None` if the client closes or stops writing first.
    pub async fn recv_op(&mut self, op: u8) -> Option<serde_json::Value> {
        loop {
            match self.recv().await? {
                Frame::Text(text) => {
                    let Ok(payload) = serde_json::from_str::<serde_json::Value>(&text) else {
                        continue;
                    };
                    if payload.get("op").and_then(serde_json::Value::as_u64) == Some(u64::from(op)) {
                        return Some(payload);
                    }
                },
                Frame::Close { .. } => return None,
            }
        }
    }

    /// Next client payload that is not a heartbeat.
    pub async fn recv_command(&mut self) -> Option<serde_json::Value> {
        loop {
            match self.recv().await? {
                Frame::Text(text) => {
                    let Ok(payload) = serde_json::from_str::<serde_json::Value>(&text) else {
                        continue;
                    };
                    if payload.get("op").and_then(serde_json::Value::as_u64) != Some(1) {
                        return Some(payload);
                    }
                },
                Frame::Close { .. } => return None,
            }
        }
    }

    /// Wait for the client's close frame and return its code.
    ///
    /// `None` if the client's writer stops without one.
    pub async fn closed(&mut self) -> Option<u16> {
        loop {
            if let Frame::Close { code, .. } = self.recv().await? {
                return Some(code);
            }
        }
    }

    /// Drop the connection from the server side (end of stream).
    pub fn hang_up(self) {
        drop(self);
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// A request seen by [`MockHttp`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// The request as sent.
    pub request: RestRequest,
    /// Its route key.
    pub endpoint: String,
}

/// Scripted HTTP transport.
///
/// Answers from a queue, falling back to `200 {}` when empty. Records
/// every request and the peak number of requests in flight.
#[derive(Debug, Clone)]
pub struct MockHttp {
    responses: Arc<Mutex<VecDeque<RateLimitResult<RestResponse>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    latency: Duration,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl Default for MockHttp {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHttp {
    /// Create an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            latency: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Hold every request for `latency` before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a response.
    #[must_use]
    pub fn with_response(self, response: RestResponse) -> Self {
        self.queue(response);
        self
    }

    /// Queue a response.
    pub fn queue(&self, response: RestResponse) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response));
        }
    }

    /// Queue a transport failure.
    pub fn queue_error(&self, message: &str) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(RateLimitError::Transport(message.to_owned())));
        }
    }

    /// Requests that reached the network, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Number of requests that reached the network.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Highest number of requests in flight at once.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for MockHttp {
    async fn send(
        &self,
        request: RestRequest,
        context: &RequestContext,
    ) -> RateLimitResult<RestResponse> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        self.peak_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                request,
                endpoint: context.endpoint.clone(),
            });
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let scripted = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        scripted.unwrap_or_else(|| {
            Ok(RestResponse {
                status: 200,
                headers: std::collections::HashMap::new(),
                body: b"{}".to_vec(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_ratelimit::Method;

    #[tokio::test]
    async fn gateway_pairs_client_and_server() {
        let (gateway, mut server) = MockGateway::new();
        let Connection { mut sink, mut stream } =
            gateway.connect("wss://gateway.discord.gg").await.unwrap();
        let mut conn = server.accept().await.unwrap();
        assert_eq!(conn.url(), "wss://gateway.discord.gg");

        assert!(conn.send_text("hello"));
        assert!(matches!(stream.recv().await, Some(Ok(Frame::Text(t))) if t == "hello"));

        sink.send(Frame::Text(r#"{"op":1,"d":null}"#.into())).await.unwrap();
        sink.send(Frame::Text(r#"{"op":2,"d":{}}"#.into())).await.unwrap();
        let identify = conn.recv_command().await.unwrap();
        assert_eq!(identify["op"], 2);

        sink.send(Frame::close(1000)).await.unwrap();
        assert_eq!(conn.closed().await, Some(1000));
    }

    #[tokio::test]
    async fn gateway_refuses_on_request() {
        let (gateway, _server) = MockGateway::new();
        gateway.refuse_next(1);
        assert!(gateway.connect("wss://a").await.is_err());
        assert!(gateway.connect("wss://b").await.is_ok());
        assert_eq!(gateway.connected_urls(), vec!["wss://a", "wss://b"]);
    }

    #[tokio::test]
    async fn http_answers_from_queue_then_default() {
        let http = MockHttp::new().with_response(RestResponse::rate_limited(Duration::from_secs(1), false));
        let request = RestRequest::new(Method::GET, "/channels/1/messages");
        let ctx = RequestContext::for_request(&request, "tok");

        assert_eq!(http.send(request.clone(), &ctx).await.unwrap().status, 429);
        assert_eq!(http.send(request, &ctx).await.unwrap().status, 200);
        assert_eq!(http.request_count(), 2);
        assert_eq!(http.requests()[0].endpoint, "GET /channels/1/messages");
    }
}
