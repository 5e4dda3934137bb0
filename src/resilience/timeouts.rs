//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound the wait for a backend response head, and for a buffered body
//!   within what is left of the same budget
//! - Cancel the exchange cleanly on expiry
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; dropping the future closes the connection
//! - Timeout errors are distinct from other errors
//! - Timed-out requests return 504 Gateway Timeout

use std::future::Future;
use std::time::Duration;

use crate::error::ProxyError;

/// Run `exchange` under `budget`, mapping expiry to [`ProxyError::BackendTimeout`].
pub async fn with_deadline<F, T>(service: &str, budget: Duration, exchange: F) -> Result<T, ProxyError>
where
    F: Future<Output = Result<T, ProxyError>>,
{
    match tokio::time::timeout(budget, exchange).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(service = %service, budget = ?budget, "Backend exchange timed out");
            Err(ProxyError::BackendTimeout {
                service: service.to_string(),
                after: budget,
            })
        }
    }
}
