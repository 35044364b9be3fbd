use crate::core::config::RateLimitConfig;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Partition key used when the client address cannot be determined
pub const FALLBACK_PARTITION: &str = "default";

/// Upper bound on the replenisher's tick period
const REPLENISH_TICK: Duration = Duration::from_millis(100);

/// Fixed-window rate limiter partitioned by client
///
/// Each partition owns `permit_limit` permits per window. Windows start when
/// the partition is first seen and then repeat on a fixed schedule, whether or
/// not requests arrive. When a partition is out of permits up to
/// `queue_limit` requests wait for the next window, served oldest first;
/// anything beyond that is rejected.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    partitions: Mutex<HashMap<String, Partition>>,
    permit_limit: usize,
    window: Duration,
    queue_limit: usize,
    trust_forwarded_headers: bool,
}

struct Partition {
    permits: usize,
    window_started: Instant,
    waiters: VecDeque<oneshot::Sender<()>>,
}

impl Partition {
    fn new(permits: usize, now: Instant) -> Self {
        Self {
            permits,
            window_started: now,
            waiters: VecDeque::new(),
        }
    }

    /// Start a new window if the current one has elapsed, handing the fresh
    /// permits to queued requests first
    fn replenish(&mut self, now: Instant, window: Duration, permit_limit: usize) {
        let elapsed = now.duration_since(self.window_started);
        if elapsed < window {
            return;
        }

        let windows_passed = (elapsed.as_nanos() / window.as_nanos()) as u32;
        self.window_started += window * windows_passed;
        self.permits = permit_limit;

        while self.permits > 0 {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            // A closed channel means the client went away; its slot costs nothing
            if waiter.send(()).is_ok() {
                self.permits -= 1;
            }
        }
    }

    fn retry_after(&self, now: Instant, window: Duration) -> u64 {
        let reset_at = self.window_started + window;
        let remaining = reset_at.saturating_duration_since(now);
        remaining.as_secs_f64().ceil().max(1.0) as u64
    }

    fn is_idle(&self, permit_limit: usize) -> bool {
        self.permits == permit_limit && self.waiters.is_empty()
    }
}

impl Inner {
    async fn replenish_all(&self, now: Instant) {
        let mut partitions = self.partitions.lock().await;
        partitions.retain(|_, partition| {
            let due = now.duration_since(partition.window_started) >= self.window;
            if !due {
                return true;
            }
            // A partition that is still full when its window closes saw no traffic
            let was_idle = partition.is_idle(self.permit_limit);
            partition.replenish(now, self.window, self.permit_limit);
            !was_idle
        });
    }
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    /// * `permit_limit` - Requests admitted per window and partition
    /// * `window` - Window length
    /// * `queue_limit` - Requests allowed to wait for the next window
    pub fn new(permit_limit: usize, window: Duration, queue_limit: usize) -> Self {
        Self::build(permit_limit, window, queue_limit, false)
    }

    /// Create a rate limiter from configuration
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::build(
            config.permit_limit,
            Duration::from_secs(config.window_secs),
            config.queue_limit,
            config.trust_forwarded_headers,
        )
    }

    fn build(
        permit_limit: usize,
        window: Duration,
        queue_limit: usize,
        trust_forwarded_headers: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                partitions: Mutex::new(HashMap::new()),
                permit_limit,
                window,
                queue_limit,
                trust_forwarded_headers,
            }),
        }
    }

    /// Admit a request for `key`, waiting in the partition's queue if needed
    pub async fn acquire(&self, key: &str) -> Result<(), RateLimitError> {
        let waiter = {
            let mut partitions = self.inner.partitions.lock().await;
            let now = Instant::now();
            let partition = partitions
                .entry(key.to_string())
                .or_insert_with(|| Partition::new(self.inner.permit_limit, now));

            partition.replenish(now, self.inner.window, self.inner.permit_limit);

            if partition.permits > 0 {
                partition.permits -= 1;
                return Ok(());
            }

            partition.waiters.retain(|waiter| !waiter.is_closed());
            if partition.waiters.len() >= self.inner.queue_limit {
                return Err(RateLimitError::LimitExceeded {
                    retry_after: partition.retry_after(now, self.inner.window),
                });
            }

            let (sender, receiver) = oneshot::channel();
            partition.waiters.push_back(sender);
            receiver
        };

        tracing::debug!(partition = %key, "Request queued by rate limiter");
        waiter.await.map_err(|_| RateLimitError::Unavailable)
    }

    /// Start the background task that resets windows on schedule and evicts
    /// idle partitions. It stops once every clone of the limiter is dropped.
    pub fn spawn_replenisher(&self) -> JoinHandle<()> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let tick = self.inner.window.min(REPLENISH_TICK);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.replenish_all(Instant::now()).await;
            }
        })
    }

    /// Number of partitions currently tracked
    pub async fn partition_count(&self) -> usize {
        self.inner.partitions.lock().await.len()
    }

    /// Partition key for a request: the peer address, or the first forwarded
    /// address when proxy headers are trusted
    pub fn partition_key(&self, request: &Request) -> String {
        if self.inner.trust_forwarded_headers {
            if let Some(ip) = forwarded_client_ip(request) {
                return ip.to_string();
            }
        }

        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| FALLBACK_PARTITION.to_string())
    }
}

/// Rate limiting errors
#[derive(Debug, PartialEq, Eq)]
pub enum RateLimitError {
    /// Partition has no permits and its queue is full
    LimitExceeded { retry_after: u64 },
    /// The limiter was dropped while the request was queued
    Unavailable,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        match self {
            RateLimitError::LimitExceeded { retry_after } => {
                let mut response = StatusCode::TOO_MANY_REQUESTS.into_response();
                response.headers_mut().insert(
                    "Retry-After",
                    HeaderValue::from_str(&retry_after.to_string())
                        .unwrap_or_else(|_| HeaderValue::from_static("60")),
                );
                response
            }
            RateLimitError::Unavailable => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        }
    }
}

/// Rate limiting stage
///
/// Admits, queues or rejects the request according to its client's partition.
/// Rejections are 429 with a `Retry-After` header and no body.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    let key = limiter.partition_key(&request);

    if let Err(e) = limiter.acquire(&key).await {
        tracing::info!(partition = %key, "Rate limit exceeded");
        return Err(e);
    }

    Ok(next.run(request).await)
}

/// Client address from `X-Forwarded-For` (first entry) or `X-Real-IP`
fn forwarded_client_ip(request: &Request) -> Option<IpAddr> {
    let headers = request.headers();

    let forwarded = headers
        .get("X-Forwarded-For")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| {
        headers
            .get("X-Real-IP")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<IpAddr>().ok())
    })
}
