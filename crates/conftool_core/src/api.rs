use anyhow::bail;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::transport::{HttpTransport, Transport};

/// Path segment every canonical resource locator contains.
pub const API_ROOT: &str = "/rest/api/";

/// Thin convenience layer over a blocking JSON transport.
///
/// The remote API has good support for discovery through the `_links`
/// attribute in results, so this only adds URL expansion and pagination on
/// top of plain HTTP calls. One client per invocation; no shared state.
pub struct Client {
    base_url: String,
    transport: Box<dyn Transport>,
}

impl Client {
    pub fn new(base_url: &str, transport: Box<dyn Transport>) -> anyhow::Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            bail!("base endpoint must not be empty (set CONFLUENCE_BASE_URL)");
        }
        Ok(Self {
            base_url,
            transport,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let transport = HttpTransport::new(&config.user_agent(), config.timeout_ms())?;
        Self::new(&config.base_url()?, Box::new(transport))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Expand a partial API path into a fully qualified URL.
    ///
    /// Relative paths that do not already start with the API root are taken
    /// as partial API paths (`space` becomes `{base}/rest/api/space`); full
    /// URLs pass through untouched.
    pub fn api_url(&self, path: &str) -> String {
        let mut url = path.to_string();
        if !url.starts_with(API_ROOT) && !url.contains("://") {
            url = format!("{API_ROOT}{}", url.trim_start_matches('/'));
        }
        if !url.starts_with("http") {
            url = format!("{}{}", self.base_url, url);
        }
        url
    }

    /// GET an API path and return the decoded document.
    pub fn get(&self, path: &str, params: &[(String, String)]) -> Result<Value> {
        let url = self.api_url(path);
        debug!("GET {url}");
        self.transport.get(&url, params)
    }

    /// All results of a paginated GET as a lazy iterator.
    ///
    /// Each response page's `results` items are yielded in order; the
    /// `_links.next` cursor is followed until absent. When `limit` is set,
    /// iteration stops after that many items. Request parameters are only
    /// sent with the first request — the cursor carries its own.
    pub fn get_all<'a>(
        &'a self,
        path: &str,
        params: &[(String, String)],
        limit: Option<usize>,
    ) -> Paged<'a> {
        Paged {
            client: self,
            next: Some(path.to_string()),
            params: params.to_vec(),
            buffer: Vec::new().into_iter(),
            remaining: limit,
            failed: false,
        }
    }

    pub fn put(&self, path: &str, body: &Value) -> Result<Value> {
        let url = self.api_url(path);
        debug!("PUT {url}");
        self.transport.put(&url, body)
    }

    pub fn delete(&self, path: &str) -> Result<()> {
        let url = self.api_url(path);
        debug!("DELETE {url}");
        self.transport.delete(&url)
    }
}

/// Lazy cursor over a paginated result set. One blocking fetch per page.
pub struct Paged<'a> {
    client: &'a Client,
    next: Option<String>,
    params: Vec<(String, String)>,
    buffer: std::vec::IntoIter<Value>,
    remaining: Option<usize>,
    failed: bool,
}

impl Iterator for Paged<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == Some(0) {
            return None;
        }
        loop {
            if let Some(item) = self.buffer.next() {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                return Some(Ok(item));
            }
            let path = self.next.take()?;
            let page = match self.client.get(&path, &self.params) {
                Ok(page) => page,
                Err(error) => {
                    self.failed = true;
                    return Some(Err(error));
                }
            };
            self.params.clear();
            self.buffer = page
                .get("results")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
                .into_iter();
            self.next = page
                .get("_links")
                .and_then(|links| links.get("next"))
                .and_then(Value::as_str)
                .map(ToString::to_string);
        }
    }
}
