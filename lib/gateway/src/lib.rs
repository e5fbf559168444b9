//! Rate-limited request gateway for the polylink integration platform.
//!
//! Every outbound platform call goes through here. The gateway provides:
//!
//! - **Token-bucket admission** per endpoint key, with bounded waiting
//!   instead of immediate rejection
//! - **Circuit breaking** with exponentially growing cooldowns and a
//!   single half-open trial request
//! - **Bounded retries** with exponential backoff and jitter for
//!   transient transport errors
//! - **Forecasting**: a best-effort estimate of time-to-exhaustion used
//!   to widen request spacing before the bucket actually empties

pub mod circuit;
pub mod error;
pub mod limiter;

pub use circuit::CircuitState;
pub use error::{CallError, GatewayError};
pub use limiter::{Forecast, GatewayConfig, RequestGateway};
