//! Property search and detail
//!
//! Thin typed wrappers; the backend does all scoring and valuation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::executor::{Endpoint, RequestExecutor};

/// Filters for `PropertyApi::search`. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub city: Option<String>,
    pub max_price: Option<u64>,
    pub min_score: Option<f64>,
    pub page: Option<u32>,
}

impl SearchFilters {
    fn apply(&self, mut endpoint: Endpoint) -> Endpoint {
        if let Some(city) = &self.city {
            endpoint = endpoint.query("city", city);
        }
        if let Some(max_price) = self.max_price {
            endpoint = endpoint.query("max_price", max_price);
        }
        if let Some(min_score) = self.min_score {
            endpoint = endpoint.query("min_score", min_score);
        }
        if let Some(page) = self.page {
            endpoint = endpoint.query("page", page);
        }
        endpoint
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Page<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PropertySummary {
    pub id: u64,
    pub title: String,
    pub city: String,
    pub price: u64,
    /// Investment score computed by the backend
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PropertyDetail {
    #[serde(flatten)]
    pub summary: PropertySummary,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub area_m2: Option<f64>,
    /// Estimated monthly rent
    #[serde(default)]
    pub estimated_rent: Option<u64>,
    /// Annual gross rental yield, percent
    #[serde(default)]
    pub gross_yield: Option<f64>,
}

/// Property endpoints.
#[derive(Clone)]
pub struct PropertyApi {
    executor: Arc<RequestExecutor>,
}

impl PropertyApi {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    pub async fn search(&self, filters: &SearchFilters) -> Result<Page<PropertySummary>> {
        let endpoint = filters.apply(Endpoint::get("properties/"));
        self.executor.fetch(&endpoint).await
    }

    pub async fn get(&self, id: u64) -> Result<PropertyDetail> {
        self.executor
            .fetch(&Endpoint::get(format!("properties/{id}/")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ApiClient, ClientConfig};
    use estate_auth::{CredentialPair, MemoryCredentialStore};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> PropertyApi {
        let config = ClientConfig {
            base_url: format!("{}/api", server.uri()),
            ..ClientConfig::default()
        };
        let store = Arc::new(MemoryCredentialStore::with_pair(CredentialPair::new("at", "rt")));
        ApiClient::new(&config, store).unwrap().properties()
    }

    #[tokio::test]
    async fn search_sends_only_set_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/properties/"))
            .and(query_param("city", "Porto"))
            .and(query_param("max_price", "250000"))
            .respond_with(|req: &wiremock::Request| {
                if req.url.query_pairs().any(|(k, _)| k == "min_score") {
                    ResponseTemplate::new(400)
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({
                        "count": 1,
                        "next": null,
                        "results": [
                            {"id": 3, "title": "T2 Bonfim", "city": "Porto", "price": 210000, "score": 7.5}
                        ]
                    }))
                }
            })
            .expect(1)
            .mount(&server)
            .await;

        let filters = SearchFilters {
            city: Some("Porto".into()),
            max_price: Some(250_000),
            ..SearchFilters::default()
        };
        let page = api(&server).search(&filters).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].id, 3);
        assert_eq!(page.results[0].score, Some(7.5));
        assert!(page.previous.is_none());
    }

    #[tokio::test]
    async fn get_returns_detail() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/properties/3/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 3,
                "title": "T2 Bonfim",
                "city": "Porto",
                "price": 210000,
                "bedrooms": 2,
                "estimated_rent": 950,
                "gross_yield": 5.4
            })))
            .mount(&server)
            .await;

        let detail = api(&server).get(3).await.unwrap();
        assert_eq!(detail.summary.city, "Porto");
        assert_eq!(detail.bedrooms, Some(2));
        assert_eq!(detail.estimated_rent, Some(950));
        assert!(detail.description.is_none());
    }

    #[tokio::test]
    async fn missing_property_is_http_404() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(serde_json::json!({"detail": "Not found."})),
            )
            .mount(&server)
            .await;

        let err = api(&server).get(99).await.unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(err.message(), "Not found.");
    }
}
