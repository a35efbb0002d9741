//! Authenticated client for the estate API
//!
//! Every call goes through one `RequestExecutor`, which attaches the stored
//! access credential, bounds the call with a timeout, and on a 401 asks the
//! shared `RefreshCoordinator` for a new credential before retrying once.
//!
//! Call flow:
//! 1. `Endpoint` describes the call (method, path, query, body, timeout)
//! 2. The executor sends it with `Authorization: Bearer <access>`
//! 3. 401 on a non-authentication endpoint → single-flight refresh
//! 4. Refresh succeeded → retry once; failed → `Error::Unauthorized`
//! 5. Failures are classified into `Error` with a status and message
//!
//! `AuthSessionManager` owns login/registration/logout and session restore.

pub mod classify;
pub mod client;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod portfolio;
pub mod properties;
pub mod refresh;
pub mod session;

pub use client::{ApiClient, ClientConfig, parse_base_url};
pub use error::{Error, ErrorKind, NO_RESPONSE_STATUS, Result, TIMEOUT_STATUS};
pub use executor::{Endpoint, Reply, RequestExecutor};
pub use portfolio::{Holding, NewHolding, PortfolioApi};
pub use properties::{Page, PropertyApi, PropertyDetail, PropertySummary, SearchFilters};
pub use refresh::RefreshCoordinator;
pub use session::AuthSessionManager;
