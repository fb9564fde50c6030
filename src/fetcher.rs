use crate::error::{ExtractError, FetchError};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Proxy, StatusCode,
};
use scraper::Html;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed request identity of one source: header set sent with every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    headers: Vec<(&'static str, &'static str)>,
}

impl Identity {
    pub const fn new(headers: Vec<(&'static str, &'static str)>) -> Identity {
        Identity { headers }
    }

    pub fn headers(&self) -> &[(&'static str, &'static str)] {
        &self.headers
    }

    fn header_map(&self) -> Result<HeaderMap, FetchError> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::Fatal(format!("header {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::Fatal(format!("header value {}: {}", value, e)))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Method {
    Get,
    PostJson(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub method: Method,
}

impl PageRequest {
    pub fn get<U: Into<String>>(url: U) -> PageRequest {
        PageRequest {
            url: url.into(),
            query: vec![],
            method: Method::Get,
        }
    }

    pub fn post_json<U: Into<String>>(url: U, body: serde_json::Value) -> PageRequest {
        PageRequest {
            url: url.into(),
            query: vec![],
            method: Method::PostJson(body),
        }
    }

    pub fn query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> PageRequest {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Stable description used in logs and for matching canned responses.
    pub fn describe(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.url, query)
    }
}

/// A successfully fetched (HTTP 200) response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub url: String,
    pub body: String,
}

impl Page {
    pub fn new<U: Into<String>, B: Into<String>>(url: U, body: B) -> Page {
        Page {
            url: url.into(),
            body: body.into(),
        }
    }

    pub fn html(&self) -> Html {
        Html::parse_document(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ExtractError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<Page, FetchError>;
}

/// Maps a status to the fetch outcome taxonomy.
pub fn classify(status: StatusCode) -> Result<(), FetchError> {
    match status {
        StatusCode::OK => Ok(()),
        StatusCode::NOT_FOUND => Err(FetchError::NotFound),
        other => Err(FetchError::Transient(Some(other.as_u16()))),
    }
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a client carrying `identity`, optionally routed through `proxy`
    /// (e.g. `socks5h://127.0.0.1:1080`).
    pub fn new(identity: &Identity, proxy: Option<&str>) -> Result<HttpFetcher, FetchError> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(60))
            .default_headers(identity.header_map()?);
        if let Some(proxy) = proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| FetchError::Fatal(format!("proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| FetchError::Fatal(e.to_string()))?;
        Ok(HttpFetcher { client })
    }
}

#[async_trait::async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<Page, FetchError> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| FetchError::Fatal(format!("{}: {}", request.url, e)))?;

        let builder = match &request.method {
            Method::Get => self.client.get(url),
            Method::PostJson(body) => self.client.post(url).json(body),
        };
        let builder = if request.query.is_empty() {
            builder
        } else {
            builder.query(&request.query)
        };

        debug!("Visit {}", request.describe());
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Request to {} failed: {}", request.url, e);
                return Err(FetchError::Transient(None));
            }
        };

        let status = response.status();
        if let Err(e) = classify(status) {
            warn!("[{}] {}", status.as_u16(), request.describe());
            return Err(e);
        }

        let final_url = response.url().to_string();
        match response.text().await {
            Ok(body) => Ok(Page::new(final_url, body)),
            Err(e) => {
                warn!("Reading body of {} failed: {}", request.url, e);
                Err(FetchError::Transient(None))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Serves canned outcomes keyed by `PageRequest::describe()`. The last
    /// outcome queued for a key is repeated once the queue runs dry; unknown
    /// keys get `NotFound`.
    #[derive(Default)]
    pub struct FakeFetcher {
        routes: Mutex<HashMap<String, VecDeque<Result<String, FetchError>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        pub fn new() -> FakeFetcher {
            FakeFetcher::default()
        }

        pub fn page<K: Into<String>, B: Into<String>>(self, key: K, body: B) -> FakeFetcher {
            self.push(key, Ok(body.into()))
        }

        pub fn fail<K: Into<String>>(self, key: K, error: FetchError) -> FakeFetcher {
            self.push(key, Err(error))
        }

        fn push<K: Into<String>>(self, key: K, outcome: Result<String, FetchError>) -> FakeFetcher {
            self.routes
                .lock()
                .unwrap()
                .entry(key.into())
                .or_default()
                .push_back(outcome);
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, key: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == key).count()
        }

        pub fn reset_calls(&self) {
            self.calls.lock().unwrap().clear();
        }
    }

    #[async_trait::async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, request: &PageRequest) -> Result<Page, FetchError> {
            let key = request.describe();
            self.calls.lock().unwrap().push(key.clone());
            let mut routes = self.routes.lock().unwrap();
            let outcome = match routes.get_mut(&key) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap_or(Err(FetchError::NotFound)),
                None => Err(FetchError::NotFound),
            };
            outcome.map(|body| Page::new(key, body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(classify(StatusCode::OK), Ok(()));
        assert_eq!(classify(StatusCode::NOT_FOUND), Err(FetchError::NotFound));
        assert_eq!(
            classify(StatusCode::FORBIDDEN),
            Err(FetchError::Transient(Some(403)))
        );
        assert_eq!(
            classify(StatusCode::BAD_GATEWAY),
            Err(FetchError::Transient(Some(502)))
        );
    }

    #[test]
    fn describe_includes_query() {
        let r = PageRequest::get("https://example.com/ajax/call")
            .query("module", "RevNewsListing")
            .query("page", "2");
        assert_eq!(
            r.describe(),
            "https://example.com/ajax/call?module=RevNewsListing&page=2"
        );
    }

    #[test]
    fn identity_builds_headers() {
        let id = Identity::new(vec![("Referer", "https://example.com/news"), ("DNT", "1")]);
        let map = id.header_map().unwrap();
        assert_eq!(map.get("referer").unwrap(), "https://example.com/news");
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn bad_header_is_fatal() {
        let id = Identity::new(vec![("Bad Header", "x")]);
        assert!(matches!(id.header_map(), Err(FetchError::Fatal(_))));
    }

    #[test]
    fn malformed_url_is_fatal() {
        let fetcher = HttpFetcher::new(&Identity::default(), None).unwrap();
        let rt = tokio::runtime::Runtime::new().unwrap();
        let res = rt.block_on(fetcher.fetch(&PageRequest::get("not a url")));
        assert!(matches!(res, Err(FetchError::Fatal(_))));
    }
}
