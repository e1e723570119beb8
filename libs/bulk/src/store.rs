//! Remote graph store interface.
//!
//! The engine talks to the store through [`GraphStore`], one call per element
//! write. Implementations must be `Send + Sync`; a single handle is shared by
//! every concurrent write task through `Arc`.

use async_trait::async_trait;

use crate::element::GraphElement;
use crate::error::WriteError;
use crate::outcome::WriteMode;

/// Store reply to one element write.
///
/// Capacity may be charged for failed writes too (a conflict still costs a
/// read), so the charge sits beside the result rather than inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteResponse {
    pub request_charge: f64,
    pub result: Result<(), WriteError>,
}

impl WriteResponse {
    pub fn ok(request_charge: f64) -> Self {
        Self {
            request_charge,
            result: Ok(()),
        }
    }

    pub fn err(request_charge: f64, error: WriteError) -> Self {
        Self {
            request_charge,
            result: Err(error),
        }
    }
}

/// Client for a throttled graph store.
///
/// # Example Implementation
///
/// ```rust,ignore
/// #[async_trait::async_trait]
/// impl GraphStore for GremlinClient {
///     async fn write_element(&self, element: &GraphElement, mode: WriteMode) -> WriteResponse {
///         let query = traversal_for(element, mode);
///         match self.submit(query).await {
///             Ok(reply) => WriteResponse::ok(reply.request_charge),
///             Err(e) if e.status == 429 => WriteResponse::err(0.0, WriteError::RateLimited {
///                 retry_after: e.retry_after,
///             }),
///             Err(e) => WriteResponse::err(e.request_charge, WriteError::Unavailable(e.to_string())),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Write one element. Never panics on store-side failure; failures are
    /// returned in the response.
    async fn write_element(&self, element: &GraphElement, mode: WriteMode) -> WriteResponse;

    /// Verify the store is reachable. Called once before the first batch.
    ///
    /// # Default
    ///
    /// Default implementation is a no-op, returning `Ok(())`.
    async fn ping(&self) -> Result<(), WriteError> {
        Ok(())
    }

    /// Release the connection. Called once when the orchestrator shuts down.
    ///
    /// # Default
    ///
    /// Default implementation is a no-op.
    async fn close(&self) {}

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "graph-store"
    }
}
