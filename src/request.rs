use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use reqwest::{header::HeaderMap, Client};
use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::pacing::{FixedDelay, Pacer};
use crate::{info_time, Error, Result};

/// One network call: POST `payload` as JSON to `endpoint`, return the body text.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn call(&self, endpoint: &str, payload: &Value, headers: &HeaderMap) -> Result<String>;
}

#[async_trait]
impl Transport for Client {
    async fn call(&self, endpoint: &str, payload: &Value, headers: &HeaderMap) -> Result<String> {
        let res = self
            .post(endpoint)
            .headers(headers.clone())
            .json(payload)
            .send()
            .await?;
        let body = res.text().await?;
        Ok(body)
    }
}

/// Completed calls of one requester run. Clones observe the same count.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    completed: Arc<AtomicUsize>,
}

impl Progress {
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    fn advance(&self) -> usize {
        self.completed.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// Sends a batch of payloads with at most `max_concurrent` calls in flight.
///
/// Every call holds a slot from a semaphore for its whole lifetime, including
/// the [`Pacer`] hooks around it. Responses come back in completion order.
/// The first failing call aborts every request still queued or in flight and
/// its error is returned; nothing is returned for the calls that did finish.
pub struct BatchRequester<T: Transport> {
    transport: Arc<T>,
    pacer: Arc<dyn Pacer>,
    headers: Arc<HeaderMap>,
    max_concurrent: usize,
}

impl<T: Transport> BatchRequester<T> {
    pub fn new(transport: T, max_concurrent: usize) -> Result<Self> {
        check_concurrency(max_concurrent)?;
        Ok(Self {
            transport: Arc::new(transport),
            pacer: Arc::new(FixedDelay::default()),
            headers: Arc::new(HeaderMap::new()),
            max_concurrent,
        })
    }

    pub fn with_pacer(mut self, pacer: impl Pacer + 'static) -> Self {
        self.pacer = Arc::new(pacer);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.with_pacer(FixedDelay(delay))
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Arc::new(headers);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn send_all(&self, endpoint: &str, payloads: Vec<Value>) -> Result<Vec<String>> {
        self.send_all_tracked(endpoint, payloads, Progress::default())
            .await
    }

    /// Same as [`send_all`](Self::send_all), counting completed calls into
    /// `progress`. Give every concurrent run its own `Progress`.
    pub async fn send_all_tracked(
        &self,
        endpoint: &str,
        payloads: Vec<Value>,
        progress: Progress,
    ) -> Result<Vec<String>> {
        if payloads.is_empty() {
            return Ok(Vec::new());
        }
        let total = payloads.len();
        let start_time = Local::now();
        info_time!(
            "Sending {} requests, at most {} at a time",
            total,
            self.max_concurrent
        );

        let gate = Arc::new(Semaphore::new(self.max_concurrent));
        let endpoint: Arc<str> = Arc::from(endpoint);

        let mut task_set = JoinSet::new();
        for payload in payloads {
            task_set.spawn({
                let gate = gate.clone();
                let transport = self.transport.clone();
                let pacer = self.pacer.clone();
                let headers = self.headers.clone();
                let endpoint = endpoint.clone();

                async move {
                    let _slot = gate.acquire_owned().await?;
                    pacer.before_call().await;
                    let body = transport.call(&endpoint, &payload, &headers).await?;
                    pacer.after_call().await;
                    Ok::<_, Error>(body)
                }
            });
        }

        let mut responses = Vec::with_capacity(total);
        while let Some(task) = task_set.join_next().await {
            // Returning early drops `task_set`, which aborts the remaining calls.
            let body = task??;
            responses.push(body);
            let done = progress.advance();
            info_time!("Sending requests: {}/{}", done, total);
        }

        info_time!(start_time, "Received {} responses", responses.len());
        Ok(responses)
    }
}

/// Sends every payload to `endpoint` over one fresh HTTP client, with at most
/// `max_concurrent` calls in flight and a pause of `delay_seconds` after each.
///
/// Responses are raw body text in completion order.
pub async fn send_all(
    endpoint: &str,
    payloads: Vec<Value>,
    headers: Option<HeaderMap>,
    max_concurrent: usize,
    delay_seconds: f64,
) -> Result<Vec<String>> {
    check_concurrency(max_concurrent)?;
    let delay = FixedDelay::from_secs_f64(delay_seconds)?;
    if payloads.is_empty() {
        return Ok(Vec::new());
    }

    let client = Client::builder().build()?;
    BatchRequester::new(client, max_concurrent)?
        .with_pacer(delay)
        .with_headers(headers.unwrap_or_default())
        .send_all(endpoint, payloads)
        .await
}

fn check_concurrency(max_concurrent: usize) -> Result<()> {
    if max_concurrent == 0 {
        return Err(Error::InvalidConcurrency(max_concurrent));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pacing::TokenBucket;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Echoes each payload's `chunk` index back and records how many calls
    /// overlapped.
    #[derive(Default)]
    struct EchoTransport {
        work: Duration,
        fail_on_call: Option<usize>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        spans: Mutex<Vec<(Instant, Instant)>>,
    }

    impl EchoTransport {
        fn with_work(work: Duration) -> Self {
            Self {
                work,
                ..Default::default()
            }
        }

        fn failing_on(call: usize, work: Duration) -> Self {
            Self {
                work,
                fail_on_call: Some(call),
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for EchoTransport {
        async fn call(&self, _: &str, payload: &Value, _: &HeaderMap) -> Result<String> {
            let started = Instant::now();
            let call_num = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

            let work = payload["work_ms"]
                .as_u64()
                .map(Duration::from_millis)
                .unwrap_or(self.work);
            tokio::time::sleep(work).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.spans.lock().unwrap().push((started, Instant::now()));

            if self.fail_on_call == Some(call_num) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                )
                .into());
            }
            Ok(payload["chunk"].to_string())
        }
    }

    fn payloads(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({ "chunk": i })).collect()
    }

    #[tokio::test]
    async fn echoes_every_payload_once() {
        let requester = BatchRequester::new(EchoTransport::default(), 3).unwrap();
        let progress = Progress::default();
        let responses = requester
            .send_all_tracked("http://fake", payloads(10), progress.clone())
            .await
            .unwrap();

        assert_eq!(responses.len(), 10);
        let got: HashSet<usize> = responses.iter().map(|r| r.parse().unwrap()).collect();
        assert_eq!(got, (0..10).collect::<HashSet<_>>());
        assert_eq!(requester.transport().calls(), 10);
        assert_eq!(progress.completed(), 10);
    }

    #[tokio::test]
    async fn returns_one_response_per_payload_for_any_width() {
        for width in 1..=6 {
            let requester =
                BatchRequester::new(EchoTransport::with_work(Duration::from_millis(1)), width)
                    .unwrap();
            let mut got: Vec<usize> = requester
                .send_all("http://fake", payloads(6))
                .await
                .unwrap()
                .iter()
                .map(|r| r.parse().unwrap())
                .collect();
            got.sort_unstable();
            assert_eq!(got, (0..6).collect::<Vec<_>>(), "width {width}");
        }
    }

    #[tokio::test]
    async fn never_exceeds_concurrency_limit() {
        let requester =
            BatchRequester::new(EchoTransport::with_work(Duration::from_millis(10)), 3).unwrap();
        requester.send_all("http://fake", payloads(12)).await.unwrap();

        let max_seen = requester.transport().max_in_flight.load(Ordering::SeqCst);
        assert!(max_seen <= 3, "saw {max_seen} calls in flight");
        assert!(max_seen >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_concurrency_limit_on_many_threads() {
        let requester =
            BatchRequester::new(EchoTransport::with_work(Duration::from_millis(5)), 2).unwrap();
        requester.send_all("http://fake", payloads(20)).await.unwrap();

        assert!(requester.transport().max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn width_one_runs_sequentially_with_delay() {
        let delay = Duration::from_millis(20);
        let requester = BatchRequester::new(EchoTransport::with_work(Duration::from_millis(2)), 1)
            .unwrap()
            .with_delay(delay);
        requester.send_all("http://fake", payloads(4)).await.unwrap();

        let mut spans = requester.transport().spans.lock().unwrap().clone();
        spans.sort_by_key(|(start, _)| *start);
        for pair in spans.windows(2) {
            let (_, prev_end) = pair[0];
            let (next_start, _) = pair[1];
            assert!(next_start >= prev_end + delay);
        }
    }

    #[tokio::test]
    async fn collects_in_completion_order() {
        let requester = BatchRequester::new(EchoTransport::default(), 4).unwrap();
        let slow_first: Vec<Value> = (0..4)
            .map(|i| json!({ "chunk": i, "work_ms": 80 - i * 25 }))
            .collect();
        let responses = requester.send_all("http://fake", slow_first).await.unwrap();

        assert_eq!(responses, vec!["3", "2", "1", "0"]);
    }

    #[tokio::test]
    async fn empty_batch_makes_no_calls() {
        let requester = BatchRequester::new(EchoTransport::default(), 2)
            .unwrap()
            .with_delay(Duration::ZERO);
        let responses = requester.send_all("http://fake", Vec::new()).await.unwrap();

        assert!(responses.is_empty());
        assert_eq!(requester.transport().calls(), 0);
    }

    #[tokio::test]
    async fn empty_batch_through_free_function() {
        let responses = send_all("http://127.0.0.1:9", Vec::new(), None, 3, 0.0)
            .await
            .unwrap();
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn failure_aborts_whole_batch() {
        let requester =
            BatchRequester::new(EchoTransport::failing_on(4, Duration::from_millis(20)), 1)
                .unwrap();
        let progress = Progress::default();
        let res = requester
            .send_all_tracked("http://fake", payloads(10), progress.clone())
            .await;

        assert!(matches!(res, Err(Error::Io(_))));
        assert!(requester.transport().calls() < 10);
        assert!(progress.completed() < 10);
    }

    #[tokio::test]
    async fn failure_aborts_wide_batch() {
        let requester =
            BatchRequester::new(EchoTransport::failing_on(4, Duration::from_millis(5)), 3)
                .unwrap();
        let res = requester.send_all("http://fake", payloads(10)).await;

        assert!(res.is_err());
    }

    #[tokio::test]
    async fn concurrent_runs_count_separately() {
        let requester =
            BatchRequester::new(EchoTransport::with_work(Duration::from_millis(5)), 2).unwrap();
        let (first, second) = (Progress::default(), Progress::default());
        let (a, b) = tokio::join!(
            requester.send_all_tracked("http://fake", payloads(6), first.clone()),
            requester.send_all_tracked("http://fake", payloads(3), second.clone()),
        );

        assert_eq!(a.unwrap().len(), 6);
        assert_eq!(b.unwrap().len(), 3);
        assert_eq!(first.completed(), 6);
        assert_eq!(second.completed(), 3);
    }

    #[tokio::test]
    async fn token_bucket_spaces_call_starts() {
        let requester = BatchRequester::new(EchoTransport::default(), 3)
            .unwrap()
            .with_pacer(TokenBucket::new(50.0, 1.0).unwrap());
        requester.send_all("http://fake", payloads(5)).await.unwrap();

        let transport = requester.transport();
        assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 3);
        let mut starts: Vec<Instant> = transport
            .spans
            .lock()
            .unwrap()
            .iter()
            .map(|(start, _)| *start)
            .collect();
        starts.sort();
        assert_eq!(starts.len(), 5);
        // one token every 20ms after the first
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(15));
        }
    }

    #[tokio::test]
    async fn huge_delay_is_rejected_not_panicking() {
        assert!(matches!(
            send_all("http://127.0.0.1:9", payloads(1), None, 1, 1e20).await,
            Err(Error::InvalidDelay(_))
        ));
    }

    #[test]
    fn rejects_zero_width() {
        assert!(matches!(
            BatchRequester::new(EchoTransport::default(), 0),
            Err(Error::InvalidConcurrency(0))
        ));
    }

    #[tokio::test]
    async fn free_function_validates_arguments() {
        assert!(matches!(
            send_all("http://fake", payloads(1), None, 0, 0.0).await,
            Err(Error::InvalidConcurrency(0))
        ));
        assert!(matches!(
            send_all("http://fake", payloads(1), None, 1, -0.5).await,
            Err(Error::InvalidDelay(_))
        ));
    }
}
