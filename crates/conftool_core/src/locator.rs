use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use percent_encoding::percent_decode_str;
use regex::Regex;
use reqwest::Url;
use serde_json::{Value, json};

use crate::api::{API_ROOT, Client};
use crate::error::{Error, Result};

static TINY_LINK: OnceLock<Regex> = OnceLock::new();
static DISPLAY_LINK: OnceLock<Regex> = OnceLock::new();

fn tiny_link_re() -> &'static Regex {
    TINY_LINK.get_or_init(|| Regex::new(r"/x/([-_A-Za-z0-9]+)").expect("tiny link pattern"))
}

fn display_link_re() -> &'static Regex {
    DISPLAY_LINK
        .get_or_init(|| Regex::new(r"/display/([^/?#]+)/([^/?#]+)").expect("display link pattern"))
}

/// Tiny link ID for the given page ID.
///
/// The page ID is packed as an unsigned 32-bit little-endian integer,
/// trailing zero bytes are stripped, and the rest is base64-encoded with
/// the URL-safe alphabet and no padding.
pub fn tiny_id(page_id: u32) -> String {
    let bytes = page_id.to_le_bytes();
    let significant = bytes
        .iter()
        .rposition(|byte| *byte != 0)
        .map_or(0, |position| position + 1);
    URL_SAFE_NO_PAD.encode(&bytes[..significant])
}

/// Extract the page ID from a so-called *tiny link*.
pub fn page_id_from_tiny_link(uri: &str) -> Result<u32> {
    let code = tiny_link_re()
        .captures(uri)
        .map(|captures| captures[1].to_string())
        .ok_or_else(|| Error::NotATinyLink(uri.to_string()))?;
    let decoded = URL_SAFE_NO_PAD
        .decode(&code)
        .map_err(|_| Error::NotATinyLink(uri.to_string()))?;
    if decoded.len() > 4 {
        return Err(Error::NotATinyLink(uri.to_string()));
    }
    let mut bytes = [0u8; 4];
    bytes[..decoded.len()].copy_from_slice(&decoded);
    Ok(u32::from_le_bytes(bytes))
}

/// Translate a user-supplied page reference into a canonical API locator.
///
/// Accepts canonical API paths (absolute or relative), `viewpage.action`
/// links carrying a `pageId`, `/display/<space>/<title>` links, tiny links,
/// and bare partial API paths. Display links cost one search query; every
/// other form is a pure string transformation.
pub fn resolve(client: &Client, reference: &str) -> Result<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(Error::MalformedReference(reference.to_string()));
    }

    // Anything already pointing into the API passes through.
    if reference.contains(API_ROOT) {
        return Ok(client.api_url(reference));
    }

    if reference.contains("/pages/viewpage.action") {
        let page_id = view_link_page_id(client, reference)?;
        return Ok(content_url(client, u64::from(page_id)));
    }

    if let Some(captures) = display_link_re().captures(reference) {
        let space = captures[1].to_string();
        let title = decode_title(&captures[2]);
        return search_unique(client, &space, &title);
    }

    if let Ok(page_id) = page_id_from_tiny_link(reference) {
        return Ok(content_url(client, u64::from(page_id)));
    }

    // Bare relative paths are partial API paths (`space`, `content/123`).
    if !reference.contains("://") {
        return Ok(client.api_url(reference));
    }

    Err(Error::MalformedReference(reference.to_string()))
}

fn content_url(client: &Client, page_id: u64) -> String {
    format!("{}{API_ROOT}content/{page_id}", client.base_url())
}

fn view_link_page_id(client: &Client, reference: &str) -> Result<u32> {
    let absolute = if reference.contains("://") {
        reference.to_string()
    } else {
        format!(
            "{}/{}",
            client.base_url(),
            reference.trim_start_matches('/')
        )
    };
    let parsed =
        Url::parse(&absolute).map_err(|_| Error::MalformedReference(reference.to_string()))?;
    let page_id = parsed
        .query_pairs()
        .find(|(key, _)| key.as_ref() == "pageId")
        .and_then(|(_, value)| value.parse::<u32>().ok())
        .unwrap_or(0);
    if page_id == 0 {
        return Err(Error::MalformedReference(reference.to_string()));
    }
    Ok(page_id)
}

fn decode_title(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// One search round-trip for a display link; exactly one hit is required.
fn search_unique(client: &Client, space: &str, title: &str) -> Result<String> {
    // '?' is a single-character wildcard in the query language, which lets
    // quoted titles match without breaking the quoting of the query itself.
    let lookup = title.replace('"', "?");
    let cql = format!("title=\"{lookup}\" AND space=\"{space}\"");
    let params = vec![
        ("cql".to_string(), cql),
        ("cqlcontext".to_string(), json!({"spaceKey": space}).to_string()),
    ];
    let results = client
        .get_all("content/search", &params, None)
        .collect::<Result<Vec<_>>>()?;
    match results.as_slice() {
        [only] => only
            .get("_links")
            .and_then(|links| links.get("self"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| Error::UnexpectedResponse {
                url: client.api_url("content/search"),
                detail: "search result is missing _links.self".to_string(),
            }),
        [] => Err(Error::AmbiguousReference(format!(
            "no match for title \"{title}\" in space \"{space}\" \
             (a freshly created page might not be indexed yet)"
        ))),
        many => Err(Error::AmbiguousReference(format!(
            "{} matches for title \"{title}\" in space \"{space}\"",
            many.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{page_id_from_tiny_link, resolve, tiny_id};
    use crate::api::Client;
    use crate::error::Error;
    use crate::transport::testing::StaticTransport;

    const BASE: &str = "https://wiki.example.com";

    fn client(transport: std::rc::Rc<StaticTransport>) -> Client {
        Client::new(BASE, Box::new(transport)).expect("client")
    }

    fn offline_client() -> Client {
        client(StaticTransport::default().shared())
    }

    #[test]
    fn tiny_id_matches_known_pages() {
        assert_eq!(tiny_id(3974246), "ZqQ8");
        assert_eq!(tiny_id(5063420), "_EJN");
    }

    #[test]
    fn tiny_link_is_parsed() {
        let page_id =
            page_id_from_tiny_link("https://wiki.example.com/x/ZqQ8").expect("page id");
        assert_eq!(page_id, 3974246);
    }

    #[test]
    fn tiny_id_round_trips() {
        for page_id in [1u32, 255, 256, 65_536, 3_974_246, 5_063_420, u32::MAX] {
            let link = format!("{BASE}/x/{}", tiny_id(page_id));
            assert_eq!(page_id_from_tiny_link(&link).expect("round trip"), page_id);
        }
    }

    #[test]
    fn malformed_tiny_link_is_rejected() {
        for uri in ["https://wiki.example.com/x/#", "https://wiki.example.com/pages", "/x/"] {
            assert!(matches!(
                page_id_from_tiny_link(uri),
                Err(Error::NotATinyLink(_))
            ));
        }
    }

    #[test]
    fn resolve_rewrites_view_links() {
        let resolved = resolve(&offline_client(), "/pages/viewpage.action?pageId=3974246")
            .expect("resolved");
        assert_eq!(resolved, format!("{BASE}/rest/api/content/3974246"));
    }

    #[test]
    fn resolve_rejects_view_links_without_usable_id() {
        for reference in [
            "/pages/viewpage.action",
            "/pages/viewpage.action?pageId=0",
            "/pages/viewpage.action?pageId=oops",
        ] {
            assert!(matches!(
                resolve(&offline_client(), reference),
                Err(Error::MalformedReference(_))
            ));
        }
    }

    #[test]
    fn resolve_decodes_tiny_links_like_view_links() {
        let client = offline_client();
        let from_tiny = resolve(&client, "/x/ZqQ8").expect("tiny");
        let from_view =
            resolve(&client, "/pages/viewpage.action?pageId=3974246").expect("view");
        assert_eq!(from_tiny, from_view);
    }

    #[test]
    fn resolve_passes_api_urls_through() {
        let client = offline_client();
        assert_eq!(
            resolve(&client, &format!("{BASE}/rest/api/content/42")).expect("absolute"),
            format!("{BASE}/rest/api/content/42")
        );
        assert_eq!(
            resolve(&client, "/rest/api/space").expect("relative"),
            format!("{BASE}/rest/api/space")
        );
        assert_eq!(
            resolve(&client, "content/42").expect("partial"),
            format!("{BASE}/rest/api/content/42")
        );
    }

    #[test]
    fn resolve_rejects_unrecognized_absolute_urls() {
        assert!(matches!(
            resolve(&offline_client(), "https://wiki.example.com/something/else"),
            Err(Error::MalformedReference(_))
        ));
    }

    #[test]
    fn resolve_display_link_uses_unique_search_hit() {
        let transport = StaticTransport::default()
            .with(
                &format!("{BASE}/rest/api/content/search"),
                json!({
                    "results": [
                        {"_links": {"self": format!("{BASE}/rest/api/content/123")}}
                    ],
                    "_links": {},
                }),
            )
            .shared();
        let client = client(transport.clone());

        let resolved = resolve(&client, "/display/DEV/Some+Page").expect("resolved");
        assert_eq!(resolved, format!("{BASE}/rest/api/content/123"));

        let requests = transport.requests.borrow();
        assert_eq!(requests.len(), 1, "exactly one search round-trip");
        assert!(requests[0].contains("cql=title=\"Some Page\" AND space=\"DEV\""));
        assert!(requests[0].contains("cqlcontext={\"spaceKey\":\"DEV\"}"));
    }

    #[test]
    fn resolve_display_link_replaces_quotes_with_wildcards() {
        let transport = StaticTransport::default()
            .with(
                &format!("{BASE}/rest/api/content/search"),
                json!({
                    "results": [
                        {"_links": {"self": format!("{BASE}/rest/api/content/7")}}
                    ],
                    "_links": {},
                }),
            )
            .shared();
        let client = client(transport.clone());

        resolve(&client, "/display/DEV/He+said+%22hi%22").expect("resolved");
        let requests = transport.requests.borrow();
        assert!(requests[0].contains("title=\"He said ?hi?\""));
    }

    #[test]
    fn resolve_display_link_without_match_is_ambiguous() {
        let transport = StaticTransport::default()
            .with(
                &format!("{BASE}/rest/api/content/search"),
                json!({"results": [], "_links": {}}),
            )
            .shared();
        let error = resolve(&client(transport), "/display/DEV/Missing").expect_err("must fail");
        assert!(matches!(error, Error::AmbiguousReference(_)));
        assert!(error.to_string().contains("not be indexed yet"));
    }

    #[test]
    fn resolve_display_link_with_multiple_matches_is_ambiguous() {
        let transport = StaticTransport::default()
            .with(
                &format!("{BASE}/rest/api/content/search"),
                json!({
                    "results": [
                        {"_links": {"self": format!("{BASE}/rest/api/content/1")}},
                        {"_links": {"self": format!("{BASE}/rest/api/content/2")}}
                    ],
                    "_links": {},
                }),
            )
            .shared();
        let error = resolve(&client(transport), "/display/DEV/Duplicate").expect_err("must fail");
        assert!(matches!(error, Error::AmbiguousReference(_)));
        assert!(error.to_string().contains("2 matches"));
    }
}
