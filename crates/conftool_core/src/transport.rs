use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::{Client, Response};
use serde_json::Value;

use crate::error::{Error, Result};

/// Blocking JSON transport the API client is built on.
///
/// Implementations report failures through [`Error::Transport`] and
/// [`Error::Status`]; retries and authentication are their concern, not the
/// caller's.
pub trait Transport {
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<Value>;
    fn put(&self, url: &str, body: &Value) -> Result<Value>;
    fn delete(&self, url: &str) -> Result<()>;
}

/// Plain HTTPS transport over `reqwest::blocking`.
pub struct HttpTransport {
    client: Client,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    fn decode(url: &str, response: Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.json().map_err(|error| Error::UnexpectedResponse {
            url: url.to_string(),
            detail: format!("body is not valid JSON: {error}"),
        })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, params: &[(String, String)]) -> Result<Value> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", self.user_agent.clone())
            .query(params)
            .send()
            .map_err(|error| Error::Transport {
                url: url.to_string(),
                message: error.to_string(),
            })?;
        Self::decode(url, response)
    }

    fn put(&self, url: &str, body: &Value) -> Result<Value> {
        let response = self
            .client
            .put(url)
            .header("User-Agent", self.user_agent.clone())
            .json(body)
            .send()
            .map_err(|error| Error::Transport {
                url: url.to_string(),
                message: error.to_string(),
            })?;
        Self::decode(url, response)
    }

    fn delete(&self, url: &str) -> Result<()> {
        let response = self
            .client
            .delete(url)
            .header("User-Agent", self.user_agent.clone())
            .send()
            .map_err(|error| Error::Transport {
                url: url.to_string(),
                message: error.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(())
    }
}
