use serde_json::Value;

use crate::api::Client;
use crate::error::{Error, Result};
use crate::node::PageNode;

/// Traversal order for [`walk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Yield whole sibling batches before descending. Batches live on a
    /// stack, so same-depth batches surface in last-in-first-out order —
    /// the children of later-visited parents come out first, not strict
    /// FIFO level order. Long-standing behavior; callers that need strict
    /// level order must collect and sort by depth.
    #[default]
    BreadthFirst,
    /// Descend into each child before its siblings.
    DepthFirst,
}

/// Walk a page tree, yielding the root and all descendants as
/// `(depth, node)` pairs.
///
/// The root document is fetched on the first pull; each node's children
/// listing is fetched right after that node is consumed, transparently
/// following pagination cursors and honoring `limit` per listing. Dropping
/// the iterator early leaves the remaining children requests un-issued.
///
/// The children relation is assumed to present each page exactly once per
/// parent; there is no cycle detection, so a malformed back-reference in
/// the remote data makes the traversal non-terminating. A transport error
/// is yielded once and ends the traversal.
pub fn walk<'a>(
    client: &'a Client,
    start_url: &str,
    params: &[(String, String)],
    order: Order,
    limit: Option<usize>,
) -> TreeWalk<'a> {
    TreeWalk {
        client,
        order,
        limit,
        params: params.to_vec(),
        root: Some(start_url.to_string()),
        stack: Vec::new(),
        current: None,
        pending: None,
        failed: false,
    }
}

/// Lazy page-tree traversal; see [`walk`].
pub struct TreeWalk<'a> {
    client: &'a Client,
    order: Order,
    limit: Option<usize>,
    params: Vec<(String, String)>,
    root: Option<String>,
    stack: Vec<(usize, Vec<Value>)>,
    current: Option<(usize, std::vec::IntoIter<Value>)>,
    pending: Option<(usize, String)>,
    failed: bool,
}

impl TreeWalk<'_> {
    fn fail(&mut self, error: Error) -> Option<<Self as Iterator>::Item> {
        self.failed = true;
        Some(Err(error))
    }
}

impl Iterator for TreeWalk<'_> {
    type Item = Result<(usize, PageNode)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(path) = self.root.take() {
            match self.client.get(&path, &self.params) {
                Ok(document) => self.stack.push((0, vec![document])),
                Err(error) => return self.fail(error),
            }
        }
        loop {
            // Children of the previously yielded node come in before the
            // next sibling is considered.
            if let Some((depth, link)) = self.pending.take() {
                let children = match self
                    .client
                    .get_all(&link, &self.params, self.limit)
                    .collect::<Result<Vec<_>>>()
                {
                    Ok(children) => children,
                    Err(error) => return self.fail(error),
                };
                match self.order {
                    Order::DepthFirst => self
                        .stack
                        .extend(children.into_iter().map(|child| (depth + 1, vec![child]))),
                    Order::BreadthFirst => self.stack.push((depth + 1, children)),
                }
            }
            if let Some((depth, nodes)) = self.current.as_mut() {
                if let Some(document) = nodes.next() {
                    let depth = *depth;
                    let node = PageNode::new(document);
                    match node.children_link() {
                        Some(link) => self.pending = Some((depth, link)),
                        None => {
                            return self.fail(Error::UnexpectedResponse {
                                url: node.id().unwrap_or("<unknown>").to_string(),
                                detail: "page document is missing _links.self".to_string(),
                            });
                        }
                    }
                    return Some(Ok((depth, node)));
                }
                self.current = None;
            }
            let (depth, nodes) = self.stack.pop()?;
            self.current = Some((depth, nodes.into_iter()));
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{Order, walk};
    use crate::api::Client;
    use crate::transport::testing::StaticTransport;

    const BASE: &str = "https://wiki.example.com";

    fn page(id: &str, title: &str) -> Value {
        json!({
            "id": id,
            "title": title,
            "_links": {"self": format!("{BASE}/rest/api/content/{id}")},
        })
    }

    fn listing(children: &[Value]) -> Value {
        json!({"results": children, "_links": {}})
    }

    fn children_url(id: &str) -> String {
        format!("{BASE}/rest/api/content/{id}/child/page")
    }

    /// Root (1) with children 2 and 3; 2 has one child 4.
    fn three_level_transport() -> std::rc::Rc<StaticTransport> {
        StaticTransport::default()
            .with(&format!("{BASE}/rest/api/content/1"), page("1", "Root"))
            .with(
                &children_url("1"),
                listing(&[page("2", "Alpha"), page("3", "Beta")]),
            )
            .with(&children_url("2"), listing(&[page("4", "Gamma")]))
            .with(&children_url("3"), listing(&[]))
            .with(&children_url("4"), listing(&[]))
            .shared()
    }

    fn collect_ids(client: &Client, order: Order) -> Vec<(usize, String)> {
        walk(client, &format!("{BASE}/rest/api/content/1"), &[], order, None)
            .map(|item| {
                let (depth, node) = item.expect("walk item");
                (depth, node.id().expect("id").to_string())
            })
            .collect()
    }

    #[test]
    fn breadth_first_covers_the_tree_level_by_level() {
        let client = Client::new(BASE, Box::new(three_level_transport())).expect("client");
        let visited = collect_ids(&client, Order::BreadthFirst);
        assert_eq!(
            visited,
            vec![
                (0, "1".to_string()),
                (1, "2".to_string()),
                (1, "3".to_string()),
                (2, "4".to_string()),
            ]
        );
    }

    #[test]
    fn depth_first_descends_before_finishing_siblings() {
        let client = Client::new(BASE, Box::new(three_level_transport())).expect("client");
        let visited = collect_ids(&client, Order::DepthFirst);
        // Singleton batches are pushed in listing order, so the stack pops
        // the last-listed sibling first.
        assert_eq!(
            visited,
            vec![
                (0, "1".to_string()),
                (1, "3".to_string()),
                (1, "2".to_string()),
                (2, "4".to_string()),
            ]
        );
    }

    #[test]
    fn both_orders_visit_the_same_node_set_exactly_once() {
        let client = Client::new(BASE, Box::new(three_level_transport())).expect("client");
        let mut bfs = collect_ids(&client, Order::BreadthFirst)
            .into_iter()
            .map(|(_, id)| id)
            .collect::<Vec<_>>();
        let mut dfs = collect_ids(&client, Order::DepthFirst)
            .into_iter()
            .map(|(_, id)| id)
            .collect::<Vec<_>>();
        bfs.sort();
        dfs.sort();
        assert_eq!(bfs, dfs);
        assert_eq!(bfs, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn breadth_first_surfaces_later_batches_first() {
        // Two parents at depth 1, each with one child: the children of the
        // later-visited parent are yielded first. Intentional stack
        // behavior, not a defect.
        let transport = StaticTransport::default()
            .with(&format!("{BASE}/rest/api/content/1"), page("1", "Root"))
            .with(
                &children_url("1"),
                listing(&[page("2", "Alpha"), page("3", "Beta")]),
            )
            .with(&children_url("2"), listing(&[page("4", "AlphaChild")]))
            .with(&children_url("3"), listing(&[page("5", "BetaChild")]))
            .with(&children_url("4"), listing(&[]))
            .with(&children_url("5"), listing(&[]))
            .shared();
        let client = Client::new(BASE, Box::new(transport)).expect("client");
        let visited = collect_ids(&client, Order::BreadthFirst);
        assert_eq!(
            visited,
            vec![
                (0, "1".to_string()),
                (1, "2".to_string()),
                (1, "3".to_string()),
                (2, "5".to_string()),
                (2, "4".to_string()),
            ]
        );
    }

    #[test]
    fn children_pagination_is_followed_transparently() {
        let transport = StaticTransport::default()
            .with(&format!("{BASE}/rest/api/content/1"), page("1", "Root"))
            .with(
                &children_url("1"),
                json!({
                    "results": [page("2", "Alpha")],
                    "_links": {"next": "/rest/api/content/1/child/page?start=1"},
                }),
            )
            .with(
                &format!("{BASE}/rest/api/content/1/child/page?start=1"),
                listing(&[page("3", "Beta")]),
            )
            .with(&children_url("2"), listing(&[]))
            .with(&children_url("3"), listing(&[]))
            .shared();
        let client = Client::new(BASE, Box::new(transport)).expect("client");
        let visited = collect_ids(&client, Order::BreadthFirst);
        assert_eq!(
            visited,
            vec![
                (0, "1".to_string()),
                (1, "2".to_string()),
                (1, "3".to_string()),
            ]
        );
    }

    #[test]
    fn children_limit_caps_each_listing() {
        let transport = StaticTransport::default()
            .with(&format!("{BASE}/rest/api/content/1"), page("1", "Root"))
            .with(
                &children_url("1"),
                listing(&[page("2", "Alpha"), page("3", "Beta"), page("4", "Gamma")]),
            )
            .with(&children_url("2"), listing(&[]))
            .shared();
        let client = Client::new(BASE, Box::new(transport)).expect("client");
        let visited = walk(
            &client,
            &format!("{BASE}/rest/api/content/1"),
            &[],
            Order::BreadthFirst,
            Some(1),
        )
        .map(|item| item.expect("walk item"))
        .map(|(_, node)| node.id().expect("id").to_string())
        .collect::<Vec<_>>();
        assert_eq!(visited, vec!["1", "2"]);
    }

    #[test]
    fn early_termination_issues_no_children_fetch() {
        let transport = three_level_transport();
        let client = Client::new(BASE, Box::new(transport.clone())).expect("client");
        let first = walk(
            &client,
            &format!("{BASE}/rest/api/content/1"),
            &[],
            Order::BreadthFirst,
            None,
        )
        .next()
        .expect("root")
        .expect("ok");
        assert_eq!(first.1.id(), Some("1"));
        let requests = transport.requests.borrow();
        assert_eq!(requests.len(), 1, "only the root document was fetched");
    }

    #[test]
    fn transport_error_aborts_the_traversal() {
        // Child listing for page 2 is not registered, so its fetch fails.
        let transport = StaticTransport::default()
            .with(&format!("{BASE}/rest/api/content/1"), page("1", "Root"))
            .with(&children_url("1"), listing(&[page("2", "Alpha")]))
            .shared();
        let client = Client::new(BASE, Box::new(transport)).expect("client");
        let mut items = walk(
            &client,
            &format!("{BASE}/rest/api/content/1"),
            &[],
            Order::BreadthFirst,
            None,
        );
        assert!(items.next().expect("root").is_ok());
        assert!(items.next().expect("child").is_ok());
        assert!(items.next().expect("failure").is_err());
        assert!(items.next().is_none());
    }
}
