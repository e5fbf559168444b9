//! Token-bucket admission and the request gateway.
//!
//! One `EndpointState` per endpoint key, guarded by its own mutex so
//! concurrent callers observe a consistent token count and circuit state.
//! State is never persisted; restarts rebuild it from defaults.

use crate::circuit::{CircuitState, cooldown_for};
use crate::error::{CallError, GatewayError};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

const CONSUMPTION_WINDOW: usize = 64;

/// Gateway configuration, shared by every endpoint key.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum tokens in the bucket.
    pub capacity: u32,
    /// Continuous refill rate, tokens per second.
    pub refill_per_sec: f64,
    /// Longest admission wait before failing with `RateLimitExceeded`.
    pub max_wait: Duration,
    /// Consecutive failures that trip the circuit.
    pub failure_threshold: u32,
    /// Cooldown after the first trip; doubles per repeated trip.
    pub base_cooldown: Duration,
    /// Upper bound on the cooldown growth.
    pub max_cooldown: Duration,
    /// Internal retries for transient transport errors.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles per attempt, with jitter.
    pub base_backoff: Duration,
    /// Forecast horizon: predicted exhaustion inside it suggests spacing.
    pub pacing_horizon: Duration,
    /// Apply the suggested spacing during admission instead of only
    /// reporting it through `forecast`.
    pub proactive_pacing: bool,
}

impl GatewayConfig {
    /// Common limit: requests per minute.
    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self {
            capacity: max_requests,
            refill_per_sec: f64::from(max_requests) / 60.0,
            ..Self::default()
        }
    }

    /// Common limit: requests per hour.
    #[must_use]
    pub fn per_hour(max_requests: u32) -> Self {
        Self {
            capacity: max_requests,
            refill_per_sec: f64::from(max_requests) / 3600.0,
            ..Self::default()
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            capacity: 60,
            refill_per_sec: 1.0,
            max_wait: Duration::from_secs(10),
            failure_threshold: 5,
            base_cooldown: Duration::from_secs(1),
            max_cooldown: Duration::from_secs(60),
            max_retries: 3,
            base_backoff: Duration::from_millis(100),
            pacing_horizon: Duration::from_secs(1),
            proactive_pacing: false,
        }
    }
}

/// Advisory time-to-exhaustion estimate for one endpoint.
///
/// Linear extrapolation of the recent consumption rate against the refill
/// rate. Best effort only; callers may use `suggested_spacing` to widen
/// their own request spacing before the bucket empties.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// Tokens currently in the bucket.
    pub tokens_remaining: f64,
    /// Predicted time until the bucket empties, if consumption outpaces
    /// refill.
    pub exhaustion_in: Option<Duration>,
    /// Request spacing that would match the refill rate.
    pub suggested_spacing: Option<Duration>,
}

/// Mutable state for one endpoint key.
struct EndpointState {
    tokens: f64,
    last_refill: Instant,
    circuit: CircuitState,
    consecutive_failures: u32,
    trip_count: u32,
    last_cooldown: Duration,
    consumption: VecDeque<Instant>,
}

impl EndpointState {
    fn new(config: &GatewayConfig) -> Self {
        Self {
            tokens: f64::from(config.capacity),
            last_refill: Instant::now(),
            circuit: CircuitState::Closed,
            consecutive_failures: 0,
            trip_count: 0,
            last_cooldown: config.base_cooldown,
            consumption: VecDeque::new(),
        }
    }

    fn refill(&mut self, now: Instant, config: &GatewayConfig) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens =
            (self.tokens + elapsed * config.refill_per_sec).min(f64::from(config.capacity));
        self.last_refill = now;
    }

    fn note_consumption(&mut self, now: Instant) {
        self.consumption.push_back(now);
        while self.consumption.len() > CONSUMPTION_WINDOW {
            self.consumption.pop_front();
        }
    }

    fn consumption_rate(&self, now: Instant) -> Option<f64> {
        if self.consumption.len() < 2 {
            return None;
        }
        let first = *self.consumption.front()?;
        let span = now.duration_since(first).as_secs_f64();
        if span <= 0.0 {
            return None;
        }
        Some(self.consumption.len() as f64 / span)
    }

    fn forecast(&self, now: Instant, config: &GatewayConfig) -> Forecast {
        let exhaustion_in = self.consumption_rate(now).and_then(|rate| {
            let net_drain = rate - config.refill_per_sec;
            (net_drain > 0.0).then(|| Duration::from_secs_f64((self.tokens / net_drain).max(0.0)))
        });
        let suggested_spacing = (exhaustion_in.is_some() && config.refill_per_sec > 0.0)
            .then(|| Duration::from_secs_f64(1.0 / config.refill_per_sec));
        Forecast {
            tokens_remaining: self.tokens,
            exhaustion_in,
            suggested_spacing,
        }
    }

    fn pacing_delay(&self, now: Instant, config: &GatewayConfig) -> Option<Duration> {
        let forecast = self.forecast(now, config);
        match forecast.exhaustion_in {
            Some(eta) if eta < config.pacing_horizon => forecast.suggested_spacing,
            _ => None,
        }
    }
}

/// Reverts an abandoned half-open trial back to OPEN.
///
/// Armed only while a trial request is in flight. If the trial future is
/// dropped at an await point (caller timeout or cancellation), the breaker
/// must not stay stuck half-open.
struct TrialGuard {
    state: Option<Arc<Mutex<EndpointState>>>,
}

impl TrialGuard {
    fn disarm(&mut self) {
        self.state = None;
    }
}

impl Drop for TrialGuard {
    fn drop(&mut self) {
        if let Some(state) = &self.state {
            let mut s = state.lock().expect("endpoint state lock poisoned");
            if let CircuitState::HalfOpen { .. } = s.circuit {
                s.circuit = CircuitState::Open {
                    opened_at: Instant::now(),
                    cooldown: s.last_cooldown,
                };
            }
        }
    }
}

enum Admitted {
    Normal,
    Trial,
}

enum Step {
    Admitted(Admitted, Option<Duration>),
    Wait(Duration),
}

/// Rate-limited, circuit-breaking gateway for outbound platform calls.
pub struct RequestGateway {
    config: GatewayConfig,
    states: Mutex<HashMap<String, Arc<Mutex<EndpointState>>>>,
}

impl RequestGateway {
    /// Creates a gateway with the given configuration.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the current configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Executes an outbound call under admission control.
    ///
    /// Admission may wait (bounded by `max_wait`) for bucket refill.
    /// Transient transport errors are retried internally with exponential
    /// backoff and jitter; rate-limit responses and circuit-open
    /// conditions are surfaced immediately, never retried.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitExceeded`, `CircuitOpen`, or `CallFailed`.
    pub async fn execute<T, F, Fut>(&self, endpoint_key: &str, op: F) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let state = self.state_for(endpoint_key);
        let trial = self.admit(endpoint_key, &state).await?;
        let mut guard = TrialGuard {
            state: trial.then(|| Arc::clone(&state)),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    self.record_success(endpoint_key, &state);
                    guard.disarm();
                    return Ok(value);
                }
                Err(err) => {
                    let mut opened = false;
                    if err.counts_toward_breaker() {
                        opened = self.record_failure(endpoint_key, &state);
                        guard.disarm();
                    }
                    let retry = !trial
                        && !opened
                        && err.is_transient()
                        && attempt <= self.config.max_retries;
                    if retry {
                        let backoff = backoff_with_jitter(attempt, self.config.base_backoff);
                        debug!(
                            endpoint = endpoint_key,
                            attempt,
                            backoff_ms = backoff.as_millis() as u64,
                            "transient failure, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    return Err(GatewayError::CallFailed {
                        endpoint: endpoint_key.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), bounded by a deadline.
    ///
    /// On timeout the in-flight call is abandoned; bucket and circuit
    /// state stay consistent (an abandoned trial reverts to OPEN).
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the deadline elapses, otherwise as `execute`.
    pub async fn execute_with_timeout<T, F, Fut>(
        &self,
        endpoint_key: &str,
        deadline: Duration,
        op: F,
    ) -> Result<T, GatewayError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        tokio::time::timeout(deadline, self.execute(endpoint_key, op))
            .await
            .map_err(|_| GatewayError::Timeout {
                endpoint: endpoint_key.to_string(),
            })?
    }

    /// Returns the advisory exhaustion forecast for an endpoint.
    #[must_use]
    pub fn forecast(&self, endpoint_key: &str) -> Forecast {
        let states = self.states.lock().expect("gateway state map lock poisoned");
        match states.get(endpoint_key) {
            None => Forecast {
                tokens_remaining: f64::from(self.config.capacity),
                exhaustion_in: None,
                suggested_spacing: None,
            },
            Some(state) => {
                let mut s = state.lock().expect("endpoint state lock poisoned");
                let now = Instant::now();
                s.refill(now, &self.config);
                s.forecast(now, &self.config)
            }
        }
    }

    /// Returns the current circuit state for an endpoint.
    #[must_use]
    pub fn circuit_state(&self, endpoint_key: &str) -> CircuitState {
        let states = self.states.lock().expect("gateway state map lock poisoned");
        states.get(endpoint_key).map_or(CircuitState::Closed, |state| {
            state.lock().expect("endpoint state lock poisoned").circuit
        })
    }

    fn state_for(&self, endpoint_key: &str) -> Arc<Mutex<EndpointState>> {
        let mut states = self.states.lock().expect("gateway state map lock poisoned");
        states
            .entry(endpoint_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(EndpointState::new(&self.config))))
            .clone()
    }

    async fn admit(
        &self,
        endpoint: &str,
        state: &Arc<Mutex<EndpointState>>,
    ) -> Result<bool, GatewayError> {
        let mut waited = Duration::ZERO;
        loop {
            let step = {
                let mut s = state.lock().expect("endpoint state lock poisoned");
                let now = Instant::now();
                s.refill(now, &self.config);
                match s.circuit {
                    CircuitState::Open { opened_at, cooldown } => {
                        let elapsed = now.duration_since(opened_at);
                        if elapsed < cooldown {
                            return Err(GatewayError::CircuitOpen {
                                endpoint: endpoint.to_string(),
                                retry_after: cooldown - elapsed,
                            });
                        }
                        s.circuit = CircuitState::HalfOpen {
                            trial_in_flight: true,
                        };
                        if s.tokens >= 1.0 {
                            s.tokens -= 1.0;
                        }
                        s.note_consumption(now);
                        debug!(endpoint, "cooldown elapsed, admitting trial request");
                        Step::Admitted(Admitted::Trial, None)
                    }
                    CircuitState::HalfOpen {
                        trial_in_flight: true,
                    } => {
                        return Err(GatewayError::CircuitOpen {
                            endpoint: endpoint.to_string(),
                            retry_after: s.last_cooldown,
                        });
                    }
                    CircuitState::HalfOpen {
                        trial_in_flight: false,
                    } => {
                        s.circuit = CircuitState::HalfOpen {
                            trial_in_flight: true,
                        };
                        if s.tokens >= 1.0 {
                            s.tokens -= 1.0;
                        }
                        s.note_consumption(now);
                        Step::Admitted(Admitted::Trial, None)
                    }
                    CircuitState::Closed => {
                        if s.tokens >= 1.0 {
                            s.tokens -= 1.0;
                            s.note_consumption(now);
                            let pacing = if self.config.proactive_pacing {
                                s.pacing_delay(now, &self.config)
                            } else {
                                None
                            };
                            Step::Admitted(Admitted::Normal, pacing)
                        } else if self.config.refill_per_sec <= 0.0 {
                            return Err(GatewayError::RateLimitExceeded {
                                endpoint: endpoint.to_string(),
                                required_wait: Duration::MAX,
                            });
                        } else {
                            let shortfall = 1.0 - s.tokens;
                            Step::Wait(Duration::from_secs_f64(
                                shortfall / self.config.refill_per_sec,
                            ))
                        }
                    }
                }
            };
            match step {
                Step::Admitted(kind, pacing) => {
                    if let Some(delay) = pacing {
                        debug!(
                            endpoint,
                            delay_ms = delay.as_millis() as u64,
                            "forecast near exhaustion, widening request spacing"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    return Ok(matches!(kind, Admitted::Trial));
                }
                Step::Wait(wait) => {
                    if waited + wait > self.config.max_wait {
                        return Err(GatewayError::RateLimitExceeded {
                            endpoint: endpoint.to_string(),
                            required_wait: wait,
                        });
                    }
                    waited += wait;
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn record_success(&self, endpoint: &str, state: &Arc<Mutex<EndpointState>>) {
        let mut s = state.lock().expect("endpoint state lock poisoned");
        s.consecutive_failures = 0;
        if matches!(s.circuit, CircuitState::HalfOpen { .. }) {
            s.circuit = CircuitState::Closed;
            s.trip_count = 0;
            debug!(endpoint, "trial request succeeded, circuit closed");
        }
    }

    /// Returns true if the circuit is open after recording the failure.
    fn record_failure(&self, endpoint: &str, state: &Arc<Mutex<EndpointState>>) -> bool {
        let mut s = state.lock().expect("endpoint state lock poisoned");
        s.consecutive_failures += 1;
        match s.circuit {
            CircuitState::HalfOpen { .. } => {
                s.trip_count += 1;
                let cooldown = cooldown_for(
                    s.trip_count,
                    self.config.base_cooldown,
                    self.config.max_cooldown,
                );
                s.last_cooldown = cooldown;
                s.circuit = CircuitState::Open {
                    opened_at: Instant::now(),
                    cooldown,
                };
                warn!(
                    endpoint,
                    cooldown_ms = cooldown.as_millis() as u64,
                    "trial request failed, circuit reopened"
                );
                true
            }
            CircuitState::Closed if s.consecutive_failures >= self.config.failure_threshold => {
                s.trip_count += 1;
                let cooldown = cooldown_for(
                    s.trip_count,
                    self.config.base_cooldown,
                    self.config.max_cooldown,
                );
                s.last_cooldown = cooldown;
                s.circuit = CircuitState::Open {
                    opened_at: Instant::now(),
                    cooldown,
                };
                warn!(
                    endpoint,
                    failures = s.consecutive_failures,
                    cooldown_ms = cooldown.as_millis() as u64,
                    "failure threshold crossed, circuit opened"
                );
                true
            }
            _ => false,
        }
    }
}

fn backoff_with_jitter(attempt: u32, base: Duration) -> Duration {
    use rand::Rng;
    let exp = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(16)));
    let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
    exp.mul_f64(jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config() -> GatewayConfig {
        GatewayConfig {
            capacity: 100,
            refill_per_sec: 10.0,
            max_wait: Duration::from_secs(5),
            failure_threshold: 5,
            base_cooldown: Duration::from_secs(1),
            max_cooldown: Duration::from_secs(60),
            max_retries: 3,
            base_backoff: Duration::from_millis(10),
            pacing_horizon: Duration::from_secs(1),
            proactive_pacing: false,
        }
    }

    async fn fail_with(gateway: &RequestGateway, endpoint: &str, err: CallError) {
        let result = gateway
            .execute(endpoint, || {
                let err = err.clone();
                async move { Err::<(), _>(err) }
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn successful_call_passes_through() {
        let gateway = RequestGateway::new(fast_config());
        let result = gateway
            .execute("github/issues", || async { Ok::<_, CallError>(42) })
            .await
            .expect("execute");
        assert_eq!(result, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_stay_within_bounds() {
        let mut config = fast_config();
        config.capacity = 3;
        config.refill_per_sec = 0.5;
        config.max_wait = Duration::from_millis(100);
        let gateway = RequestGateway::new(config);

        for _ in 0..3 {
            gateway
                .execute("ep", || async { Ok::<_, CallError>(()) })
                .await
                .expect("execute");
        }
        let forecast = gateway.forecast("ep");
        assert!(forecast.tokens_remaining >= 0.0);

        // An empty bucket with a slow refill rejects rather than waits.
        let err = gateway
            .execute("ep", || async { Ok::<_, CallError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));

        // A long idle period refills to capacity, never beyond it.
        tokio::time::advance(Duration::from_secs(3600)).await;
        let forecast = gateway.forecast("ep");
        assert!((forecast.tokens_remaining - 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn insufficient_tokens_delay_rather_than_reject() {
        let mut config = fast_config();
        config.capacity = 1;
        config.refill_per_sec = 10.0;
        let gateway = RequestGateway::new(config);

        gateway
            .execute("ep", || async { Ok::<_, CallError>(()) })
            .await
            .expect("first call");

        let start = Instant::now();
        gateway
            .execute("ep", || async { Ok::<_, CallError>(()) })
            .await
            .expect("second call");
        // Shortfall of one token at 10/s means roughly a 100ms wait.
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_beyond_max_is_rejected() {
        let mut config = fast_config();
        config.capacity = 1;
        config.refill_per_sec = 0.01;
        config.max_wait = Duration::from_secs(1);
        let gateway = RequestGateway::new(config);

        gateway
            .execute("ep", || async { Ok::<_, CallError>(()) })
            .await
            .expect("first call");

        let err = gateway
            .execute("ep", || async { Ok::<_, CallError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::RateLimitExceeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn endpoint_keys_are_isolated() {
        let mut config = fast_config();
        config.capacity = 1;
        config.refill_per_sec = 0.01;
        config.max_wait = Duration::from_millis(100);
        let gateway = RequestGateway::new(config);

        gateway
            .execute("a", || async { Ok::<_, CallError>(()) })
            .await
            .expect("a");
        assert!(
            gateway
                .execute("a", || async { Ok::<_, CallError>(()) })
                .await
                .is_err()
        );
        // A different endpoint still has its own full bucket.
        gateway
            .execute("b", || async { Ok::<_, CallError>(()) })
            .await
            .expect("b");
    }

    #[tokio::test(start_paused = true)]
    async fn circuit_opens_after_consecutive_failures() {
        let gateway = RequestGateway::new(fast_config());
        let calls = AtomicUsize::new(0);

        for _ in 0..5 {
            let result = gateway
                .execute("ep", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(CallError::Server { status: 500 }) }
                })
                .await;
            assert!(matches!(result, Err(GatewayError::CallFailed { .. })));
        }
        assert!(gateway.circuit_state("ep").is_open());

        // During OPEN the operation is never invoked.
        let err = gateway
            .execute("ep", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, CallError>(()) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let gateway = RequestGateway::new(fast_config());

        for _ in 0..4 {
            fail_with(&gateway, "ep", CallError::Server { status: 503 }).await;
        }
        gateway
            .execute("ep", || async { Ok::<_, CallError>(()) })
            .await
            .expect("success");

        // Four more failures stay under the threshold again.
        for _ in 0..4 {
            fail_with(&gateway, "ep", CallError::Server { status: 503 }).await;
        }
        assert!(!gateway.circuit_state("ep").is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_exactly_one_trial() {
        let mut config = fast_config();
        config.failure_threshold = 1;
        let gateway = Arc::new(RequestGateway::new(config));

        fail_with(&gateway, "ep", CallError::Server { status: 500 }).await;
        assert!(gateway.circuit_state("ep").is_open());

        tokio::time::advance(Duration::from_secs(2)).await;

        // First caller enters the trial and parks inside the operation.
        let notify = Arc::new(tokio::sync::Notify::new());
        let trial = tokio::spawn({
            let gateway = Arc::clone(&gateway);
            let notify = Arc::clone(&notify);
            async move {
                gateway
                    .execute("ep", move || {
                        let notify = Arc::clone(&notify);
                        async move {
                            notify.notified().await;
                            Ok::<_, CallError>(42)
                        }
                    })
                    .await
            }
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        // A concurrent second request is rejected without a second trial.
        let second = gateway
            .execute("ep", || async { Ok::<_, CallError>(0) })
            .await;
        assert!(matches!(second, Err(GatewayError::CircuitOpen { .. })));

        notify.notify_one();
        let result = trial.await.expect("join").expect("trial succeeds");
        assert_eq!(result, 42);
        assert_eq!(gateway.circuit_state("ep"), CircuitState::Closed);

        gateway
            .execute("ep", || async { Ok::<_, CallError>(1) })
            .await
            .expect("circuit closed again");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_trial_reopens_with_longer_cooldown() {
        let mut config = fast_config();
        config.failure_threshold = 1;
        config.base_cooldown = Duration::from_secs(1);
        let gateway = RequestGateway::new(config);

        // First trip: cooldown 1s.
        fail_with(&gateway, "ep", CallError::Server { status: 500 }).await;

        tokio::time::advance(Duration::from_millis(1500)).await;
        // Trial fails: second trip, cooldown doubles to 2s.
        fail_with(&gateway, "ep", CallError::Server { status: 500 }).await;

        tokio::time::advance(Duration::from_millis(1500)).await;
        let err = gateway
            .execute("ep", || async { Ok::<_, CallError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::CircuitOpen { .. }));

        tokio::time::advance(Duration::from_millis(1000)).await;
        gateway
            .execute("ep", || async { Ok::<_, CallError>(()) })
            .await
            .expect("trial after full cooldown succeeds");
        assert_eq!(gateway.circuit_state("ep"), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_transport_errors_are_retried() {
        let gateway = RequestGateway::new(fast_config());
        let calls = Arc::new(AtomicUsize::new(0));

        let result = gateway
            .execute("ep", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CallError::Transport {
                            reason: "connection reset".to_string(),
                        })
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await
            .expect("retried to success");
        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let mut config = fast_config();
        config.max_retries = 2;
        config.failure_threshold = 100;
        let gateway = RequestGateway::new(config);
        let calls = Arc::new(AtomicUsize::new(0));

        let err = gateway
            .execute("ep", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(CallError::Transport {
                        reason: "down".to_string(),
                    })
                }
            })
            .await
            .unwrap_err();
        // Initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            err,
            GatewayError::CallFailed { attempts: 3, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn platform_rate_limit_is_never_retried() {
        let gateway = RequestGateway::new(fast_config());
        let calls = AtomicUsize::new(0);

        for _ in 0..6 {
            let err = gateway
                .execute("ep", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async {
                        Err::<(), _>(CallError::RateLimited {
                            retry_after_secs: Some(30),
                        })
                    }
                })
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                GatewayError::CallFailed {
                    attempts: 1,
                    source: CallError::RateLimited { .. },
                    ..
                }
            ));
        }
        // Platform rate limits do not trip the breaker.
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(!gateway.circuit_state("ep").is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_surfaces_timeout() {
        let gateway = RequestGateway::new(fast_config());
        let err = gateway
            .execute_with_timeout("ep", Duration::from_millis(10), || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, CallError>(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn forecast_predicts_exhaustion_under_heavy_consumption() {
        let mut config = fast_config();
        config.capacity = 10;
        config.refill_per_sec = 1.0;
        let gateway = RequestGateway::new(config);

        for _ in 0..5 {
            gateway
                .execute("ep", || async { Ok::<_, CallError>(()) })
                .await
                .expect("execute");
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        let forecast = gateway.forecast("ep");
        assert!(forecast.tokens_remaining <= 10.0);
        assert!(forecast.exhaustion_in.is_some());
        assert_eq!(forecast.suggested_spacing, Some(Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn forecast_idle_endpoint_reports_full_bucket() {
        let gateway = RequestGateway::new(fast_config());
        let forecast = gateway.forecast("never-used");
        assert!((forecast.tokens_remaining - 100.0).abs() < f64::EPSILON);
        assert!(forecast.exhaustion_in.is_none());
        assert!(forecast.suggested_spacing.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn proactive_pacing_widens_spacing() {
        let mut config = fast_config();
        config.capacity = 10;
        config.refill_per_sec = 1.0;
        config.pacing_horizon = Duration::from_secs(10);
        config.proactive_pacing = true;
        let gateway = RequestGateway::new(config);

        let start = Instant::now();
        for _ in 0..4 {
            gateway
                .execute("ep", || async { Ok::<_, CallError>(()) })
                .await
                .expect("execute");
            tokio::time::advance(Duration::from_millis(1)).await;
        }
        // Consumption far outpaces refill, so admission inserts at least
        // one refill-rate spacing delay.
        assert!(start.elapsed() >= Duration::from_secs(1));
    }
}
