use anyhow::{Result, bail};
use serde_json::{Value, json};
use similar::TextDiff;

use crate::api::Client;
use crate::error::Error;
use crate::node::PageNode;

/// Markup representation of a page body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Markup {
    View,
    Editor,
    #[default]
    Storage,
    ExportView,
    AnonymousExportView,
}

impl Markup {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "view" => Ok(Self::View),
            "editor" => Ok(Self::Editor),
            "storage" => Ok(Self::Storage),
            "export" | "export_view" => Ok(Self::ExportView),
            "anon" | "anonymous_export_view" => Ok(Self::AnonymousExportView),
            other => bail!("unsupported markup format: {other} (expected view|editor|storage|export|anon)"),
        }
    }

    /// Field name used in `expand=body.<name>` and the response body map.
    pub fn api_name(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Editor => "editor",
            Self::Storage => "storage",
            Self::ExportView => "export_view",
            Self::AnonymousExportView => "anonymous_export_view",
        }
    }
}

/// A page loaded with enough state to be modified and written back.
pub struct Page {
    node: PageNode,
    markup: Markup,
    body: String,
}

impl Page {
    /// Load the given page with space, version, and body expanded.
    pub fn load(client: &Client, url: &str, markup: Markup) -> Result<Self> {
        let expand = format!("space,version,body.{}", markup.api_name());
        let document = client.get(url, &[("expand".to_string(), expand)])?;
        let node = PageNode::new(document);
        let body = node
            .body(markup.api_name())
            .ok_or_else(|| Error::UnexpectedResponse {
                url: url.to_string(),
                detail: format!("page has no body.{} value", markup.api_name()),
            })?
            .to_string();
        Ok(Self { node, markup, body })
    }

    pub fn id(&self) -> &str {
        self.node.id().unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.node.title().unwrap_or("")
    }

    pub fn space_key(&self) -> &str {
        self.node.space_key().unwrap_or("")
    }

    pub fn version(&self) -> i64 {
        self.node.version().unwrap_or(0)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn node(&self) -> &PageNode {
        &self.node
    }

    /// Write a changed body back as a new version.
    ///
    /// Returns `false` without issuing a request when the body is
    /// unchanged. Only pages loaded in storage markup can be written.
    pub fn update(&mut self, client: &Client, body: &str) -> Result<bool> {
        if self.markup != Markup::Storage {
            bail!("can only update pages loaded in storage markup");
        }
        if body == self.body {
            return Ok(false);
        }
        let self_link = self.node.self_link().ok_or_else(|| Error::UnexpectedResponse {
            url: self.id().to_string(),
            detail: "page document is missing _links.self".to_string(),
        })?;
        let payload = json!({
            "type": "page",
            "space": {"key": self.space_key()},
            "title": self.title(),
            "version": {"number": self.version() + 1},
            "body": {
                "storage": {
                    "value": body,
                    "representation": "storage",
                }
            },
        });
        let response = client.put(self_link, &payload)?;

        let mut document = self.node.clone().into_value();
        document["body"]["storage"]["value"] = Value::String(body.to_string());
        if let Some(version) = response.get("version") {
            document["version"] = version.clone();
        }
        self.node = PageNode::new(document);
        self.body = body.to_string();
        Ok(true)
    }

    /// Unified diff between the stored body and a changed one.
    ///
    /// Empty when both are identical. Diffs the markup lines as stored;
    /// bodies are not reformatted first.
    pub fn diff(&self, changed: &str) -> String {
        if self.body == changed {
            return String::new();
        }
        let old_header = format!("v. {} of \"{}\"", self.version(), self.title());
        let new_header = format!("v. {} of \"{}\"", self.version() + 1, self.title());
        TextDiff::from_lines(self.body.as_str(), changed)
            .unified_diff()
            .context_radius(2)
            .header(&old_header, &new_header)
            .to_string()
    }
}
