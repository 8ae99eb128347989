//! Workout-tracking API client
//!
//! Thin endpoint surface over the guarded executor. All collection
//! endpoints paginate with 1-indexed `page`/`page_size` parameters and
//! answer requests past the last page with 404, which this client maps to
//! graceful exhaustion rather than an error.

use std::sync::Arc;
use url::Url;

use super::executor::{RequestDescriptor, RequestExecutor};
use super::rate_limit::RateLimitTracker;
use crate::config::ApiCredentials;
use crate::error::SyncError;
use crate::models::EntityId;
use crate::storage::{KvStore, Row};

pub const DEFAULT_BASE_URL: &str = "https://api.fittrack.io/v1";

/// A paginated collection endpoint and the key its items live under in
/// the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub items_key: &'static str,
}

pub mod endpoints {
    use super::Endpoint;

    pub const EXERCISES: Endpoint = Endpoint {
        path: "exercise_templates",
        items_key: "exercise_templates",
    };
    pub const ROUTINE_FOLDERS: Endpoint = Endpoint {
        path: "routine_folders",
        items_key: "routine_folders",
    };
    pub const ROUTINES: Endpoint = Endpoint {
        path: "routines",
        items_key: "routines",
    };
    pub const WORKOUTS: Endpoint = Endpoint {
        path: "workouts",
        items_key: "workouts",
    };
    /// Change log for workouts; items are events, not entity bodies.
    pub const WORKOUT_EVENTS: Endpoint = Endpoint {
        path: "workouts/events",
        items_key: "events",
    };
}

/// Identifies one page request. Pages are 1-indexed.
#[derive(Debug, Clone)]
pub struct PageCursor {
    pub endpoint: Endpoint,
    pub page: u32,
    pub page_size: u32,
    pub extra_params: Vec<(String, String)>,
}

/// One decoded page of a collection.
#[derive(Debug, Clone)]
pub struct PageData {
    pub items: Vec<Row>,
    /// Server-supplied total page count, when the envelope carries one.
    pub page_count: Option<u32>,
}

/// The fetch surface the sync orchestrators run against. Implemented by
/// [`ApiClient`] for production and by scripted fakes in tests.
pub trait CollectionApi: Send + Sync {
    /// Fetch one page. `Ok(None)` means the collection is exhausted.
    fn fetch_page(&self, cursor: &PageCursor) -> Result<Option<PageData>, SyncError>;

    /// Fetch one full entity body by id.
    fn get_entity(&self, endpoint: Endpoint, id: &EntityId) -> Result<Row, SyncError>;
}

pub struct ApiClient {
    executor: RequestExecutor,
    base_url: String,
    api_key: String,
}

impl ApiClient {
    pub fn new(credentials: ApiCredentials, store: Arc<dyn KvStore>) -> Self {
        Self::with_base_url(credentials, store, DEFAULT_BASE_URL)
            .expect("default base URL is valid")
    }

    pub fn with_base_url(
        credentials: ApiCredentials,
        store: Arc<dyn KvStore>,
        base_url: &str,
    ) -> Result<Self, SyncError> {
        Url::parse(base_url)
            .map_err(|e| SyncError::validation(format!("invalid base URL {base_url}: {e}")))?;
        let tracker = RateLimitTracker::new(store);
        Ok(Self {
            executor: RequestExecutor::new(tracker),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: credentials.api_key,
        })
    }

    pub fn tracker(&self) -> &RateLimitTracker {
        self.executor.tracker()
    }

    fn request(&self, url: String) -> RequestDescriptor {
        RequestDescriptor::get(url)
            .header("api-key", self.api_key.clone())
            .header("accept", "application/json")
    }

    fn page_url(&self, cursor: &PageCursor) -> String {
        let mut url = format!(
            "{}/{}?page={}&page_size={}",
            self.base_url, cursor.endpoint.path, cursor.page, cursor.page_size
        );
        for (name, value) in &cursor.extra_params {
            url.push_str(&format!("&{}={}", name, urlencoding::encode(value)));
        }
        url
    }
}

impl CollectionApi for ApiClient {
    fn fetch_page(&self, cursor: &PageCursor) -> Result<Option<PageData>, SyncError> {
        let descriptor = self.request(self.page_url(cursor));
        match self.executor.execute(&descriptor) {
            Ok(response) => {
                let envelope: serde_json::Value = response.read_json()?;
                let items = envelope
                    .get(cursor.endpoint.items_key)
                    .and_then(serde_json::Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let page_count = envelope
                    .get("page_count")
                    .and_then(serde_json::Value::as_u64)
                    .map(|n| n as u32);
                Ok(Some(PageData { items, page_count }))
            }
            // Past the last page; the collection is exhausted.
            Err(SyncError::Api { status: 404, .. }) => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn get_entity(&self, endpoint: Endpoint, id: &EntityId) -> Result<Row, SyncError> {
        let url = format!(
            "{}/{}/{}",
            self.base_url,
            endpoint.path,
            urlencoding::encode(id.as_str())
        );
        let response = self.executor.execute(&self.request(url))?;
        response.read_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryKvStore;

    fn client() -> ApiClient {
        ApiClient::new(
            ApiCredentials::new("00000000-0000-0000-0000-000000000000"),
            Arc::new(InMemoryKvStore::new()),
        )
    }

    #[test]
    fn test_page_url_encodes_extra_params() {
        let client = client();
        let cursor = PageCursor {
            endpoint: endpoints::WORKOUT_EVENTS,
            page: 2,
            page_size: 50,
            extra_params: vec![("since".to_string(), "2026-01-01T00:00:00+00:00".to_string())],
        };
        let url = client.page_url(&cursor);
        assert_eq!(
            url,
            "https://api.fittrack.io/v1/workouts/events?page=2&page_size=50&since=2026-01-01T00%3A00%3A00%2B00%3A00"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = ApiClient::with_base_url(
            ApiCredentials::new("k"),
            Arc::new(InMemoryKvStore::new()),
            "not a url",
        );
        assert!(matches!(result, Err(SyncError::Validation { .. })));
    }

    #[test]
    fn test_trailing_slash_normalized() {
        let client = ApiClient::with_base_url(
            ApiCredentials::new("k"),
            Arc::new(InMemoryKvStore::new()),
            "https://api.fittrack.io/v1/",
        )
        .unwrap();
        let cursor = PageCursor {
            endpoint: endpoints::WORKOUTS,
            page: 1,
            page_size: 10,
            extra_params: Vec::new(),
        };
        assert!(
            client
                .page_url(&cursor)
                .starts_with("https://api.fittrack.io/v1/workouts?")
        );
    }
}
