//! The user's portfolio of tracked properties

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::executor::{Endpoint, RequestExecutor};

/// A property held in the portfolio.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Holding {
    pub id: u64,
    pub property: u64,
    /// Price paid, if recorded
    #[serde(default)]
    pub purchase_price: Option<u64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Body of `PortfolioApi::add`.
#[derive(Debug, Clone, Serialize)]
pub struct NewHolding {
    pub property: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<u64>,
}

/// Portfolio endpoints.
#[derive(Clone)]
pub struct PortfolioApi {
    executor: Arc<RequestExecutor>,
}

impl PortfolioApi {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    pub async fn list(&self) -> Result<Vec<Holding>> {
        self.executor.fetch(&Endpoint::get("portfolio/")).await
    }

    pub async fn add(&self, holding: &NewHolding) -> Result<Holding> {
        self.executor
            .fetch(&Endpoint::post("portfolio/").json(holding))
            .await
    }

    /// Remove a holding. The backend answers 204, but a body is tolerated.
    pub async fn remove(&self, id: u64) -> Result<()> {
        let removed: Option<serde_json::Value> = self
            .executor
            .execute(&Endpoint::delete(format!("portfolio/{id}/")))
            .await?;
        debug!(id, body = removed.is_some(), "holding removed");
        Ok(())
    }
}
