//! Periodic forecast polling.
//!
//! A single timer task drives the fetcher. Each tick supersedes whatever
//! request is still pending: the old task is aborted and its generation
//! number retired, so a reply that slips through anyway is recognised as
//! stale and dropped. Only the reply for the newest generation may touch the
//! collection or emit an event.

pub mod transport;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Url;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::data::collection::ForecastCollection;
use crate::data::decoder;
use crate::error::{FailureKind, FetchError};
use transport::{build_request_url, redact_api_key, HttpResponse, ReqwestTransport, Transport, TransportError};

const EVENT_CAPACITY: usize = 16;
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    AwaitingResponse,
}

/// Outcome of one fetch cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    /// The collection holds a new batch.
    Updated,
    /// The cycle ended without touching the collection.
    Failed { kind: FailureKind, message: String },
}

#[derive(Debug, Clone)]
struct Target {
    latitude: f64,
    longitude: f64,
    api_key: String,
}

struct Cycle {
    state: FetchState,
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
    last_error: Option<FetchError>,
    api_url: String,
}

struct Shared<T> {
    transport: T,
    collection: Arc<ForecastCollection>,
    base_url: Url,
    target: Mutex<Target>,
    cycle: Mutex<Cycle>,
    events: broadcast::Sender<FetchEvent>,
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Transport> Shared<T> {
    /// Supersede any pending request and send a fresh one.
    fn issue(self: &Arc<Self>) {
        let url = {
            let target = lock(&self.target);
            build_request_url(&self.base_url, target.latitude, target.longitude, &target.api_key)
        };

        let mut cycle = lock(&self.cycle);
        if let Some(stale) = cycle.in_flight.take() {
            if !stale.is_finished() {
                debug!("Superseding forecast request #{}", cycle.generation);
            }
            stale.abort();
        }

        cycle.generation += 1;
        let generation = cycle.generation;
        cycle.state = FetchState::AwaitingResponse;
        cycle.api_url = url.clone();

        debug!("Forecast request #{}: GET {}", generation, redact_api_key(&url));
        let request = self.transport.get(url);
        let shared = Arc::clone(self);
        cycle.in_flight = Some(tokio::spawn(async move {
            let result = request.await;
            shared.complete(generation, result);
        }));
    }

    fn complete(&self, generation: u64, result: Result<HttpResponse, TransportError>) {
        let mut cycle = lock(&self.cycle);
        if generation != cycle.generation || cycle.state != FetchState::AwaitingResponse {
            debug!("Discarding reply for superseded forecast request #{}", generation);
            return;
        }
        cycle.state = FetchState::Idle;
        cycle.in_flight = None;

        let outcome = result
            .map_err(|e| FetchError::Network(e.0))
            .and_then(accept_status)
            .and_then(|body| decoder::decode(&body).map_err(FetchError::from));

        match outcome {
            Ok(records) => {
                self.collection.replace(records);
                cycle.last_error = None;
                let _ = self.events.send(FetchEvent::Updated);
            }
            Err(err) => {
                warn!("Forecast request #{} failed: {}", generation, err);
                let _ = self.events.send(FetchEvent::Failed {
                    kind: err.kind(),
                    message: err.to_string(),
                });
                cycle.last_error = Some(err);
            }
        }
    }
}

fn accept_status(response: HttpResponse) -> Result<Vec<u8>, FetchError> {
    if response.status == 200 {
        return Ok(response.body);
    }

    let body = String::from_utf8_lossy(&response.body);
    let excerpt: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    let message = match (response.reason.is_empty(), excerpt.is_empty()) {
        (false, false) => format!("HTTP {} {}: {}", response.status, response.reason, excerpt),
        (false, true) => format!("HTTP {} {}", response.status, response.reason),
        (true, false) => format!("HTTP {}: {}", response.status, excerpt),
        (true, true) => format!("HTTP {}", response.status),
    };
    Err(FetchError::Network(message))
}

/// Polls the forecast API and publishes results into a [`ForecastCollection`].
///
/// Must be used from within a Tokio runtime: ticks and replies run as tasks.
pub struct PollingFetcher<T: Transport = ReqwestTransport> {
    shared: Arc<Shared<T>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> PollingFetcher<T> {
    pub fn new(transport: T, collection: Arc<ForecastCollection>, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid forecast API URL: {}", base_url))?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            shared: Arc::new(Shared {
                transport,
                collection,
                base_url,
                target: Mutex::new(Target {
                    latitude: 0.0,
                    longitude: 0.0,
                    api_key: String::new(),
                }),
                cycle: Mutex::new(Cycle {
                    state: FetchState::Idle,
                    generation: 0,
                    in_flight: None,
                    last_error: None,
                    api_url: String::new(),
                }),
                events,
            }),
            timer: Mutex::new(None),
        })
    }

    /// Set the location and key used by the next request.
    pub fn configure(&self, latitude: f64, longitude: f64, api_key: impl Into<String>) {
        let api_key = api_key.into();
        if api_key.is_empty() {
            warn!("Forecast API key is empty, requests will be rejected");
        }
        info!("Forecast target set to lat={} lon={}", latitude, longitude);

        *lock(&self.shared.target) = Target {
            latitude,
            longitude,
            api_key,
        };
    }

    /// Poll every `interval`, starting now.
    ///
    /// Restarting while a request is pending leaves that request alone and
    /// delays the first new tick by one interval.
    pub fn start(&self, interval: Duration) {
        if interval.is_zero() {
            warn!("Refusing to poll with a zero interval");
            return;
        }

        let mut timer = lock(&self.timer);
        let restarting = match timer.take() {
            Some(previous) => {
                previous.abort();
                true
            }
            None => false,
        };

        let first_tick = if restarting && self.state() == FetchState::AwaitingResponse {
            Instant::now() + interval
        } else {
            Instant::now()
        };

        info!(
            "{} forecast polling every {}s",
            if restarting { "Restarting" } else { "Starting" },
            interval.as_secs_f64()
        );

        let shared = Arc::clone(&self.shared);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(first_tick, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                shared.issue();
            }
        }));
    }

    /// Stop ticking. A pending request still completes.
    pub fn stop(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
            info!("Forecast polling stopped");
        }
    }

    /// One out-of-band tick.
    pub fn request_now(&self) {
        self.shared.issue();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FetchEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> FetchState {
        lock(&self.shared.cycle).state
    }

    pub fn last_error(&self) -> Option<FetchError> {
        lock(&self.shared.cycle).last_error.clone()
    }

    /// URL of the most recent request, key included.
    pub fn api_url(&self) -> String {
        lock(&self.shared.cycle).api_url.clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.timer).is_some()
    }
}

impl<T: Transport> Drop for PollingFetcher<T> {
    fn drop(&mut self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::ForecastRecord;
    use crate::error::DecodeError;
    use futures::future::{BoxFuture, FutureExt};
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::sync::{mpsc, oneshot};
    use tokio::time::{sleep, timeout};

    type Reply = Result<HttpResponse, TransportError>;

    struct PendingRequest {
        url: String,
        reply: oneshot::Sender<Reply>,
    }

    impl PendingRequest {
        fn respond(self, reply: Reply) {
            // The receiving task may already be aborted.
            let _ = self.reply.send(reply);
        }
    }

    /// Replies are handed back by the test, in any order.
    struct ManualTransport {
        requests: mpsc::UnboundedSender<PendingRequest>,
    }

    impl Transport for ManualTransport {
        fn get(&self, url: String) -> BoxFuture<'static, Reply> {
            let (reply, rx) = oneshot::channel();
            let _ = self.requests.send(PendingRequest { url, reply });
            async move {
                rx.await
                    .unwrap_or_else(|_| Err(TransportError("reply dropped".to_string())))
            }
            .boxed()
        }
    }

    struct Harness {
        fetcher: PollingFetcher<ManualTransport>,
        collection: Arc<ForecastCollection>,
        requests: mpsc::UnboundedReceiver<PendingRequest>,
        events: broadcast::Receiver<FetchEvent>,
    }

    fn harness() -> Harness {
        let (tx, requests) = mpsc::unbounded_channel();
        let collection = Arc::new(ForecastCollection::new());
        let fetcher = PollingFetcher::new(
            ManualTransport { requests: tx },
            Arc::clone(&collection),
            "http://forecast.test/data/2.5/forecast",
        )
        .unwrap();
        fetcher.configure(48.4, 9.98, "key");
        let events = fetcher.subscribe();

        Harness {
            fetcher,
            collection,
            requests,
            events,
        }
    }

    fn ok(body: &str) -> Reply {
        Ok(HttpResponse {
            status: 200,
            reason: "OK".to_string(),
            body: body.as_bytes().to_vec(),
        })
    }

    fn batch_body(city: &str, n: usize) -> String {
        let entries: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"dt":{},"main":{{"temp":{}.5}}}}"#, 1_700_000_000 + i * 10_800, i))
            .collect();
        format!(r#"{{"city":{{"name":"{}"}},"list":[{}]}}"#, city, entries.join(","))
    }

    async fn next_event(events: &mut broadcast::Receiver<FetchEvent>) -> FetchEvent {
        timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("no event within 1s")
            .expect("event channel closed")
    }

    async fn next_request(requests: &mut mpsc::UnboundedReceiver<PendingRequest>) -> PendingRequest {
        timeout(Duration::from_secs(1), requests.recv())
            .await
            .expect("no request within 1s")
            .expect("transport dropped")
    }

    async fn assert_no_event(events: &mut broadcast::Receiver<FetchEvent>) {
        sleep(Duration::from_millis(30)).await;
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    }

    fn seed(collection: &ForecastCollection) -> Vec<ForecastRecord> {
        let records = decoder::decode(batch_body("Ulm", 3).as_bytes()).unwrap();
        collection.replace(records.clone());
        records
    }

    #[tokio::test]
    async fn test_successful_cycle_replaces_and_notifies() {
        let mut h = harness();
        h.fetcher.request_now();
        assert_eq!(h.fetcher.state(), FetchState::AwaitingResponse);

        let request = next_request(&mut h.requests).await;
        assert_eq!(
            request.url,
            "http://forecast.test/data/2.5/forecast?lat=48.4&lon=9.98&appid=key&units=metric"
        );
        assert_eq!(h.fetcher.api_url(), request.url);
        request.respond(ok(&batch_body("London", 2)));

        assert_eq!(next_event(&mut h.events).await, FetchEvent::Updated);
        assert_eq!(h.collection.len(), 2);
        assert_eq!(h.collection.at(0).city_name, "London");
        assert!(h.collection.at(0).is_current);
        assert_eq!(h.fetcher.state(), FetchState::Idle);
        assert!(h.fetcher.last_error().is_none());
        assert_no_event(&mut h.events).await;
    }

    #[tokio::test]
    async fn test_http_error_leaves_collection_untouched() {
        let mut h = harness();
        let before = seed(&h.collection);

        h.fetcher.request_now();
        next_request(&mut h.requests).await.respond(Ok(HttpResponse {
            status: 404,
            reason: "Not Found".to_string(),
            body: br#"{"cod":"404","message":"city not found"}"#.to_vec(),
        }));

        match next_event(&mut h.events).await {
            FetchEvent::Failed { kind, message } => {
                assert_eq!(kind, FailureKind::Network);
                assert!(message.contains("404"), "message was {message}");
                assert!(message.contains("city not found"), "message was {message}");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(*h.collection.snapshot(), before);
        assert_eq!(h.fetcher.last_error().map(|e| e.kind()), Some(FailureKind::Network));
        assert_eq!(h.fetcher.state(), FetchState::Idle);
    }

    #[tokio::test]
    async fn test_transport_error_is_network_failure() {
        let mut h = harness();
        h.fetcher.request_now();
        next_request(&mut h.requests)
            .await
            .respond(Err(TransportError("connection refused".to_string())));

        assert_eq!(
            next_event(&mut h.events).await,
            FetchEvent::Failed {
                kind: FailureKind::Network,
                message: "Network error: connection refused".to_string(),
            }
        );
        assert!(h.collection.is_empty());
    }

    #[tokio::test]
    async fn test_decode_errors_are_decode_failures() {
        let mut h = harness();
        let before = seed(&h.collection);

        h.fetcher.request_now();
        next_request(&mut h.requests).await.respond(ok("not json"));
        match next_event(&mut h.events).await {
            FetchEvent::Failed { kind, .. } => assert_eq!(kind, FailureKind::Decode),
            other => panic!("expected failure, got {:?}", other),
        }

        h.fetcher.request_now();
        next_request(&mut h.requests)
            .await
            .respond(ok(r#"{"city":{"name":"Ulm"}}"#));
        match next_event(&mut h.events).await {
            FetchEvent::Failed { kind, .. } => assert_eq!(kind, FailureKind::Decode),
            other => panic!("expected failure, got {:?}", other),
        }

        assert_eq!(h.fetcher.last_error(), Some(FetchError::Decode(DecodeError::MissingList)));
        assert_eq!(*h.collection.snapshot(), before);
    }

    #[tokio::test]
    async fn test_success_clears_last_error() {
        let mut h = harness();
        h.fetcher.request_now();
        next_request(&mut h.requests).await.respond(ok("{"));
        next_event(&mut h.events).await;
        assert!(h.fetcher.last_error().is_some());

        h.fetcher.request_now();
        next_request(&mut h.requests).await.respond(ok(r#"{"list":[]}"#));
        assert_eq!(next_event(&mut h.events).await, FetchEvent::Updated);
        assert!(h.fetcher.last_error().is_none());
        assert_eq!(h.collection.len(), 0);
    }

    #[tokio::test]
    async fn test_newer_request_supersedes_stale_reply() {
        let mut h = harness();

        h.fetcher.request_now();
        let stale = next_request(&mut h.requests).await;
        h.fetcher.request_now();
        let fresh = next_request(&mut h.requests).await;

        fresh.respond(ok(&batch_body("Fresh", 2)));
        assert_eq!(next_event(&mut h.events).await, FetchEvent::Updated);

        stale.respond(ok(&batch_body("Stale", 5)));
        assert_no_event(&mut h.events).await;

        assert_eq!(h.collection.len(), 2);
        assert!(h.collection.snapshot().iter().all(|r| r.city_name == "Fresh"));
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded_on_arrival() {
        let mut h = harness();

        h.fetcher.request_now();
        h.fetcher.request_now();
        let _first = next_request(&mut h.requests).await;
        let _second = next_request(&mut h.requests).await;

        // Deliver a reply tagged with the retired generation directly.
        h.fetcher.shared.complete(1, ok(&batch_body("Stale", 1)));
        h.fetcher
            .shared
            .complete(1, Err(TransportError("late failure".to_string())));

        assert_no_event(&mut h.events).await;
        assert!(h.collection.is_empty());
        assert_eq!(h.fetcher.state(), FetchState::AwaitingResponse);
    }

    #[tokio::test]
    async fn test_configure_applies_to_next_request() {
        let mut h = harness();

        h.fetcher.configure(1.0, 2.0, "first");
        h.fetcher.request_now();
        let a = next_request(&mut h.requests).await;
        assert!(a.url.contains("lat=1&lon=2&appid=first"), "url was {}", a.url);

        h.fetcher.configure(3.25, -4.5, "second");
        h.fetcher.request_now();
        let b = next_request(&mut h.requests).await;
        assert!(b.url.contains("lat=3.25&lon=-4.5&appid=second"), "url was {}", b.url);
    }

    #[tokio::test]
    async fn test_start_ticks_immediately_then_periodically() {
        let mut h = harness();
        h.fetcher.start(Duration::from_millis(40));
        assert!(h.fetcher.is_running());

        for _ in 0..3 {
            next_request(&mut h.requests).await;
        }

        h.fetcher.stop();
        h.fetcher.stop();
        assert!(!h.fetcher.is_running());

        while h.requests.try_recv().is_ok() {}
        sleep(Duration::from_millis(120)).await;
        assert!(h.requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_timer_tick_supersedes_pending_request() {
        let mut h = harness();
        h.fetcher.start(Duration::from_millis(100));

        let stale = next_request(&mut h.requests).await;
        let fresh = next_request(&mut h.requests).await;
        assert_eq!(h.fetcher.state(), FetchState::AwaitingResponse);

        fresh.respond(ok(&batch_body("Fresh", 2)));
        assert_eq!(next_event(&mut h.events).await, FetchEvent::Updated);
        h.fetcher.stop();

        stale.respond(ok(&batch_body("Stale", 5)));
        assert_no_event(&mut h.events).await;

        assert_eq!(h.collection.len(), 2);
        assert!(h.collection.snapshot().iter().all(|r| r.city_name == "Fresh"));
    }

    #[tokio::test]
    async fn test_invalid_base_url_is_rejected() {
        let (tx, _requests) = mpsc::unbounded_channel();
        let result = PollingFetcher::new(
            ManualTransport { requests: tx },
            Arc::new(ForecastCollection::new()),
            "not a url",
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_stop_lets_pending_request_finish() {
        let mut h = harness();
        h.fetcher.start(Duration::from_secs(60));
        let request = next_request(&mut h.requests).await;

        h.fetcher.stop();
        request.respond(ok(&batch_body("Ulm", 4)));

        assert_eq!(next_event(&mut h.events).await, FetchEvent::Updated);
        assert_eq!(h.collection.len(), 4);
    }

    #[tokio::test]
    async fn test_restart_does_not_supersede_pending_request() {
        let mut h = harness();
        h.fetcher.start(Duration::from_secs(60));
        let request = next_request(&mut h.requests).await;

        h.fetcher.start(Duration::from_secs(60));
        sleep(Duration::from_millis(30)).await;
        assert!(h.requests.try_recv().is_err());

        request.respond(ok(&batch_body("Ulm", 1)));
        assert_eq!(next_event(&mut h.events).await, FetchEvent::Updated);
        assert_eq!(h.collection.len(), 1);
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let h = harness();
        h.fetcher.start(Duration::ZERO);
        assert!(!h.fetcher.is_running());
    }

    #[test]
    fn test_accept_status_messages() {
        let not_found = HttpResponse {
            status: 404,
            reason: "Not Found".to_string(),
            body: Vec::new(),
        };
        assert_eq!(
            accept_status(not_found),
            Err(FetchError::Network("HTTP 404 Not Found".to_string()))
        );

        let custom = HttpResponse {
            status: 599,
            reason: String::new(),
            body: b"upstream timeout".to_vec(),
        };
        assert_eq!(
            accept_status(custom),
            Err(FetchError::Network("HTTP 599: upstream timeout".to_string()))
        );
    }
}
