use serde_json::Value;

/// Read-only view of one content item as returned by the remote system.
///
/// Response documents are kept as immutable JSON; these accessors replace
/// ad-hoc key chasing at call sites. A node is never mutated after fetch.
#[derive(Debug, Clone)]
pub struct PageNode(Value);

impl PageNode {
    pub fn new(document: Value) -> Self {
        Self(document)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.0.get("title").and_then(Value::as_str)
    }

    pub fn self_link(&self) -> Option<&str> {
        self.0
            .get("_links")
            .and_then(|links| links.get("self"))
            .and_then(Value::as_str)
    }

    /// Location of this node's paginated children listing.
    pub fn children_link(&self) -> Option<String> {
        self.self_link().map(|link| format!("{link}/child/page"))
    }

    pub fn space_key(&self) -> Option<&str> {
        self.0
            .get("space")
            .and_then(|space| space.get("key"))
            .and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<i64> {
        self.0
            .get("version")
            .and_then(|version| version.get("number"))
            .and_then(Value::as_i64)
    }

    /// Body text in the given representation, when expanded into the document.
    pub fn body(&self, representation: &str) -> Option<&str> {
        self.0
            .get("body")
            .and_then(|body| body.get(representation))
            .and_then(|markup| markup.get("value"))
            .and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::PageNode;

    fn sample() -> PageNode {
        PageNode::new(json!({
            "id": "3974246",
            "title": "Release Notes",
            "space": {"key": "DEV"},
            "version": {"number": 5},
            "body": {"storage": {"value": "<p>hello</p>", "representation": "storage"}},
            "_links": {"self": "https://wiki.example.com/rest/api/content/3974246"},
        }))
    }

    #[test]
    fn accessors_read_expanded_document() {
        let node = sample();
        assert_eq!(node.id(), Some("3974246"));
        assert_eq!(node.title(), Some("Release Notes"));
        assert_eq!(node.space_key(), Some("DEV"));
        assert_eq!(node.version(), Some(5));
        assert_eq!(node.body("storage"), Some("<p>hello</p>"));
        assert_eq!(
            node.children_link().as_deref(),
            Some("https://wiki.example.com/rest/api/content/3974246/child/page")
        );
    }

    #[test]
    fn accessors_tolerate_missing_fields() {
        let node = PageNode::new(json!({"id": "1"}));
        assert_eq!(node.title(), None);
        assert_eq!(node.children_link(), None);
        assert_eq!(node.body("storage"), None);
    }
}
