use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Result as AnyResult, anyhow};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::time::sleep;

use super::parse::parse_datetime;

pub const NOTION_API_URL: &str = "https://api.notion.com/v1";
pub const NOTION_VERSION: &str = "2022-06-28";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: usize = 100;

pub const RETRIEVE_PAGE: &str = "retrieve_page";
pub const RETRIEVE_DATABASE: &str = "retrieve_database";
pub const QUERY_DATABASE: &str = "query_database";

#[derive(Debug, Error)]
pub enum NotionError {
    #[error("transient failure calling {endpoint}: {reason}")]
    Transient { endpoint: String, reason: String },

    #[error("{endpoint} rejected (status {status:?}): {message}")]
    Api {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    #[error("cannot decode {endpoint} response: {reason}")]
    Decode { endpoint: String, reason: String },
}

impl NotionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NotionError::Transient { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NotionError::Api { status: Some(404), .. })
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504)
}

/// A remote page: its id, edit stamp and the raw property bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    #[serde(default)]
    pub last_edited_time: Option<String>,
    #[serde(default)]
    pub properties: Value,
}

impl Page {
    pub fn new(id: impl Into<String>, properties: Value) -> Self {
        Self {
            id: id.into(),
            last_edited_time: None,
            properties,
        }
    }

    pub fn edited_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_edited_time = Some(at.to_rfc3339());
        self
    }

    pub fn last_edited(&self) -> Option<DateTime<Utc>> {
        self.last_edited_time.as_deref().and_then(parse_datetime)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<Page>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseResponse {
    id: String,
    last_edited_time: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    pub id: String,
    pub last_edited_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    LastEditedDescending,
    LastEditedAscending,
}

impl Sort {
    fn to_json(self) -> Value {
        let direction = match self {
            Sort::LastEditedDescending => "descending",
            Sort::LastEditedAscending => "ascending",
        };
        json!([{ "timestamp": "last_edited_time", "direction": direction }])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    Exponential,
}

/// Bounded retry applied around every remote request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
    pub backoff: Backoff,
    pub retryable: fn(&NotionError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
            backoff: Backoff::Exponential,
            retryable: NotionError::is_transient,
        }
    }
}

impl RetryPolicy {
    /// Retries transient failures without sleeping in between.
    pub fn immediate(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
            backoff: Backoff::Fixed,
            ..Self::default()
        }
    }

    /// Delay before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        if self.delay.is_zero() {
            return Duration::ZERO;
        }
        let base_ms = self.delay.as_millis();
        let delay_ms = match self.backoff {
            Backoff::Fixed => base_ms,
            Backoff::Exponential => {
                let cap_shift = (attempt.saturating_sub(1) as u32).min(20);
                base_ms.saturating_mul(1u128 << cap_shift)
            }
        };
        let jitter = ((attempt as u64).wrapping_mul(37) % 100) as u128;
        let total_ms = delay_ms.saturating_add(jitter);
        Duration::from_millis(u64::try_from(total_ms).unwrap_or(u64::MAX))
    }
}

enum Request<'r> {
    RetrievePage(&'r str),
    RetrieveDatabase(&'r str),
    Query {
        database_id: &'r str,
        cursor: Option<&'r str>,
        sort: Option<Sort>,
    },
}

impl Request<'_> {
    fn endpoint(&self) -> &'static str {
        match self {
            Request::RetrievePage(_) => RETRIEVE_PAGE,
            Request::RetrieveDatabase(_) => RETRIEVE_DATABASE,
            Request::Query { .. } => QUERY_DATABASE,
        }
    }
}

enum Response {
    Page(Page),
    Database(DatabaseInfo),
    Query(QueryResponse),
}

enum NotionBackend {
    Http {
        client: reqwest::Client,
        base_url: String,
    },
    Mock {
        state: Arc<MockNotion>,
    },
}

/// Handle on the remote notes service.
pub struct NotionInterface {
    backend: NotionBackend,
    retry: RetryPolicy,
}

impl NotionInterface {
    pub fn new_http(token: &str) -> AnyResult<Self> {
        Self::new_http_with_base(token, NOTION_API_URL)
    }

    pub fn new_http_with_base(token: &str, base_url: &str) -> AnyResult<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| anyhow!("Invalid Notion token: {}", e))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert("Notion-Version", HeaderValue::from_static(NOTION_VERSION));

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        info!("NotionInterface::new_http base_url={}", base_url);
        Ok(Self {
            backend: NotionBackend::Http {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            retry: RetryPolicy::default(),
        })
    }

    pub fn new_mock(state: Arc<MockNotion>) -> Self {
        debug!("NotionInterface::new_mock creating mock backend");
        Self {
            backend: NotionBackend::Mock { state },
            retry: RetryPolicy::immediate(3),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn retrieve_page(&self, page_id: &str) -> Result<Page, NotionError> {
        match self.call_with_retry(&Request::RetrievePage(page_id)).await? {
            Response::Page(page) => Ok(page),
            _ => Err(unexpected(RETRIEVE_PAGE)),
        }
    }

    pub async fn retrieve_database(&self, database_id: &str) -> Result<DatabaseInfo, NotionError> {
        match self
            .call_with_retry(&Request::RetrieveDatabase(database_id))
            .await?
        {
            Response::Database(info) => Ok(info),
            _ => Err(unexpected(RETRIEVE_DATABASE)),
        }
    }

    /// Last edit time of a database as a whole.
    pub async fn catalog_last_modified(&self, database_id: &str) -> Result<DateTime<Utc>, NotionError> {
        Ok(self.retrieve_database(database_id).await?.last_edited_time)
    }

    /// One page of query results starting at `cursor`.
    pub async fn query_database(
        &self,
        database_id: &str,
        cursor: Option<&str>,
        sort: Option<Sort>,
    ) -> Result<QueryResponse, NotionError> {
        let request = Request::Query {
            database_id,
            cursor,
            sort,
        };
        match self.call_with_retry(&request).await? {
            Response::Query(response) => Ok(response),
            _ => Err(unexpected(QUERY_DATABASE)),
        }
    }

    /// Lazily walks every page of a database. Each call starts over.
    pub fn query(&self, database_id: &str, sort: Option<Sort>) -> PageCursor<'_> {
        PageCursor {
            notion: self,
            database_id: database_id.to_string(),
            sort,
            buffer: VecDeque::new(),
            next_cursor: None,
            done: false,
        }
    }

    async fn call(&self, request: &Request<'_>) -> Result<Response, NotionError> {
        match &self.backend {
            NotionBackend::Http { client, base_url } => {
                http_call(client, base_url, request).await
            }
            NotionBackend::Mock { state } => state.handle(request),
        }
    }

    async fn call_with_retry(&self, request: &Request<'_>) -> Result<Response, NotionError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let endpoint = request.endpoint();
        let mut attempt: usize = 0;
        loop {
            attempt += 1;
            debug!(
                "{} attempt={} max_attempts={}",
                endpoint, attempt, max_attempts
            );
            match self.call(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !(self.retry.retryable)(&e) {
                        return Err(e);
                    }
                    warn!("{} failed on attempt {}: {}", endpoint, attempt, e);
                    if attempt >= max_attempts {
                        error!("{} exhausted attempts={}", endpoint, attempt);
                        return Err(e);
                    }
                    let pause = self.retry.delay_after(attempt);
                    debug!("{} sleeping ms={} before next attempt", endpoint, pause.as_millis());
                    sleep(pause).await;
                }
            }
        }
    }
}

fn unexpected(endpoint: &str) -> NotionError {
    NotionError::Decode {
        endpoint: endpoint.to_string(),
        reason: "unexpected response kind".to_string(),
    }
}

async fn http_call(
    client: &reqwest::Client,
    base_url: &str,
    request: &Request<'_>,
) -> Result<Response, NotionError> {
    let endpoint = request.endpoint();
    match request {
        Request::RetrievePage(id) => {
            let url = format!("{}/pages/{}", base_url, id);
            let page: Page = send(endpoint, client.get(url)).await?;
            Ok(Response::Page(page))
        }
        Request::RetrieveDatabase(id) => {
            let url = format!("{}/databases/{}", base_url, id);
            let raw: DatabaseResponse = send(endpoint, client.get(url)).await?;
            let last_edited_time =
                parse_datetime(&raw.last_edited_time).ok_or_else(|| NotionError::Decode {
                    endpoint: endpoint.to_string(),
                    reason: format!("bad last_edited_time '{}'", raw.last_edited_time),
                })?;
            Ok(Response::Database(DatabaseInfo {
                id: raw.id,
                last_edited_time,
            }))
        }
        Request::Query {
            database_id,
            cursor,
            sort,
        } => {
            let url = format!("{}/databases/{}/query", base_url, database_id);
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(cursor) = cursor {
                body["start_cursor"] = json!(cursor);
            }
            if let Some(sort) = sort {
                body["sorts"] = sort.to_json();
            }
            let response: QueryResponse = send(endpoint, client.post(url).json(&body)).await?;
            Ok(Response::Query(response))
        }
    }
}

async fn send<T: DeserializeOwned>(
    endpoint: &str,
    builder: reqwest::RequestBuilder,
) -> Result<T, NotionError> {
    let response = builder.send().await.map_err(|e| {
        if e.is_timeout() || e.is_connect() {
            NotionError::Transient {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        } else {
            NotionError::Api {
                endpoint: endpoint.to_string(),
                status: None,
                message: e.to_string(),
            }
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| NotionError::Decode {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        });
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);

    if is_retryable_status(status) {
        Err(NotionError::Transient {
            endpoint: endpoint.to_string(),
            reason: format!("status {}: {}", status.as_u16(), message),
        })
    } else {
        Err(NotionError::Api {
            endpoint: endpoint.to_string(),
            status: Some(status.as_u16()),
            message,
        })
    }
}

/// Restartable, lazy walk over query results. A remote page of results is
/// fetched only once the previous one has been consumed.
pub struct PageCursor<'a> {
    notion: &'a NotionInterface,
    database_id: String,
    sort: Option<Sort>,
    buffer: VecDeque<Page>,
    next_cursor: Option<String>,
    done: bool,
}

impl PageCursor<'_> {
    pub async fn next(&mut self) -> Result<Option<Page>, NotionError> {
        if let Some(page) = self.buffer.pop_front() {
            return Ok(Some(page));
        }
        if self.done {
            return Ok(None);
        }

        let response = self
            .notion
            .query_database(&self.database_id, self.next_cursor.as_deref(), self.sort)
            .await?;
        debug!(
            "query {} returned {} results has_more={}",
            self.database_id,
            response.results.len(),
            response.has_more
        );
        self.next_cursor = response.next_cursor;
        self.done = !response.has_more || self.next_cursor.is_none();
        self.buffer.extend(response.results);
        Ok(self.buffer.pop_front())
    }

    /// Drains the cursor.
    pub async fn collect_all(mut self) -> Result<Vec<Page>, NotionError> {
        let mut pages = Vec::new();
        while let Some(page) = self.next().await? {
            pages.push(page);
        }
        Ok(pages)
    }
}

#[derive(Default)]
struct MockDatabase {
    last_edited_time: Option<DateTime<Utc>>,
    pages: Vec<String>,
}

#[derive(Default)]
struct MockState {
    pages: HashMap<String, Page>,
    databases: HashMap<String, MockDatabase>,
    calls: HashMap<&'static str, usize>,
    failures_left: usize,
    page_size: Option<usize>,
}

/// In-memory stand-in for the remote service. Counts every request per
/// endpoint, retries included.
#[derive(Default)]
pub struct MockNotion {
    state: Mutex<MockState>,
}

impl MockNotion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_database(&self, database_id: &str, last_edited_time: DateTime<Utc>) {
        let mut state = self.lock();
        state
            .databases
            .entry(database_id.to_string())
            .or_default()
            .last_edited_time = Some(last_edited_time);
    }

    pub fn touch_database(&self, database_id: &str, last_edited_time: DateTime<Utc>) {
        self.add_database(database_id, last_edited_time);
    }

    /// Stores a page, listing it in `database_id` when given. Re-adding an
    /// id replaces the page.
    pub fn add_page(&self, database_id: Option<&str>, page: Page) {
        let mut state = self.lock();
        if let Some(database_id) = database_id {
            let database = state.databases.entry(database_id.to_string()).or_default();
            if !database.pages.contains(&page.id) {
                database.pages.push(page.id.clone());
            }
        }
        state.pages.insert(page.id.clone(), page);
    }

    /// The next `n` requests fail with a transient error.
    pub fn fail_next(&self, n: usize) {
        self.lock().failures_left = n;
    }

    pub fn set_page_size(&self, size: usize) {
        self.lock().page_size = Some(size.max(1));
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.lock().calls.get(endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.values().sum()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    fn handle(&self, request: &Request<'_>) -> Result<Response, NotionError> {
        let endpoint = request.endpoint();
        let mut state = self.lock();
        *state.calls.entry(endpoint).or_default() += 1;

        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(NotionError::Transient {
                endpoint: endpoint.to_string(),
                reason: "status 503: injected failure".to_string(),
            });
        }

        match request {
            Request::RetrievePage(id) => state
                .pages
                .get(*id)
                .cloned()
                .map(Response::Page)
                .ok_or_else(|| missing(endpoint, id)),
            Request::RetrieveDatabase(id) => {
                let database = state.databases.get(*id).ok_or_else(|| missing(endpoint, id))?;
                Ok(Response::Database(DatabaseInfo {
                    id: id.to_string(),
                    last_edited_time: database.last_edited_time.unwrap_or(DateTime::UNIX_EPOCH),
                }))
            }
            Request::Query {
                database_id,
                cursor,
                sort,
            } => {
                let database = state
                    .databases
                    .get(*database_id)
                    .ok_or_else(|| missing(endpoint, database_id))?;
                let mut pages: Vec<Page> = database
                    .pages
                    .iter()
                    .filter_map(|id| state.pages.get(id).cloned())
                    .collect();
                match sort {
                    Some(Sort::LastEditedDescending) => {
                        pages.sort_by_key(|p| std::cmp::Reverse(p.last_edited()))
                    }
                    Some(Sort::LastEditedAscending) => pages.sort_by_key(|p| p.last_edited()),
                    None => {}
                }

                let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
                let size = state.page_size.unwrap_or(PAGE_SIZE);
                let end = (start + size).min(pages.len());
                let has_more = end < pages.len();
                Ok(Response::Query(QueryResponse {
                    results: pages.get(start..end).map(<[Page]>::to_vec).unwrap_or_default(),
                    has_more,
                    next_cursor: has_more.then(|| end.to_string()),
                }))
            }
        }
    }
}

fn missing(endpoint: &str, id: &str) -> NotionError {
    NotionError::Api {
        endpoint: endpoint.to_string(),
        status: Some(404),
        message: format!("Could not find object with ID: {}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notion_with_pages(n: usize) -> (Arc<MockNotion>, NotionInterface) {
        let mock = MockNotion::new();
        mock.add_database("db", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        for i in 0..n {
            let edited = Utc.with_ymd_and_hms(2024, 1, 1 + i as u32, 0, 0, 0).unwrap();
            mock.add_page(Some("db"), Page::new(format!("p{}", i), json!({})).edited_at(edited));
        }
        let notion = NotionInterface::new_mock(mock.clone());
        (mock, notion)
    }

    #[test]
    fn exponential_delay_doubles() {
        let policy = RetryPolicy {
            delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        let first = policy.delay_after(1).as_millis();
        let second = policy.delay_after(2).as_millis();
        assert!((100..200).contains(&first));
        assert!((200..300).contains(&second));
        assert_eq!(RetryPolicy::immediate(3).delay_after(5), Duration::ZERO);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let (mock, notion) = notion_with_pages(1);
        mock.fail_next(2);
        let page = notion.retrieve_page("p0").await.unwrap();
        assert_eq!(page.id, "p0");
        assert_eq!(mock.calls(RETRIEVE_PAGE), 3);
    }

    #[tokio::test]
    async fn persistent_failure_surfaces_after_max_attempts() {
        let (mock, notion) = notion_with_pages(1);
        mock.fail_next(10);
        let err = notion.retrieve_page("p0").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(mock.calls(RETRIEVE_PAGE), 3);
    }

    #[tokio::test]
    async fn missing_page_is_not_retried() {
        let (mock, notion) = notion_with_pages(0);
        let err = notion.retrieve_page("ghost").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(mock.calls(RETRIEVE_PAGE), 1);
    }

    #[tokio::test]
    async fn cursor_fetches_lazily_and_restarts() {
        let (mock, notion) = notion_with_pages(5);
        mock.set_page_size(2);

        let mut cursor = notion.query("db", Some(Sort::LastEditedDescending));
        let first = cursor.next().await.unwrap().unwrap();
        assert_eq!(first.id, "p4");
        assert_eq!(mock.calls(QUERY_DATABASE), 1);

        let rest = cursor.collect_all().await.unwrap();
        assert_eq!(rest.len(), 4);
        assert_eq!(mock.calls(QUERY_DATABASE), 3);

        let again = notion.query("db", None).collect_all().await.unwrap();
        assert_eq!(again.len(), 5);
        assert_eq!(again[0].id, "p0");
    }

    #[tokio::test]
    async fn database_stamp_is_reported() {
        let (mock, notion) = notion_with_pages(0);
        let later = Utc.with_ymd_and_hms(2024, 2, 1, 12, 0, 0).unwrap();
        mock.touch_database("db", later);
        assert_eq!(notion.catalog_last_modified("db").await.unwrap(), later);
        assert_eq!(mock.calls(RETRIEVE_DATABASE), 1);
    }
}
