//! Page routes of the finance admin application.
//!
//! Routes form a tree keyed by path segment. A page's effective requirement
//! is the conjunction of every enclosing section's requirement, the page's
//! component, and the page's own requirement.

mod pages;

use std::collections::BTreeMap;

use platform_authz::{Authorization, ComponentId, RouteRequirement};
use serde::Serialize;
use tracing::trace;

pub use pages::Page;

#[derive(Debug, Default)]
struct Node {
    requirement: Option<RouteRequirement>,
    page: Option<Page>,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn child_mut(&mut self, segment: &str) -> &mut Node {
        self.children.entry(segment.to_string()).or_default()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// A page matched against a concrete path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRoute<'a> {
    pub page: &'a Page,
    pub requirement: RouteRequirement,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub path: &'static str,
    pub title: &'static str,
    pub component: ComponentId,
}

#[derive(Debug, Default)]
pub struct RouteTree {
    root: Node,
}

impl RouteTree {
    /// The application's full route table.
    pub fn finance() -> Self {
        let mut tree = Self::default();
        for (prefix, requirement) in pages::sections() {
            tree.guard(prefix, requirement);
        }
        for page in pages::pages() {
            tree.insert(page);
        }
        tree
    }

    fn node_mut(&mut self, path: &str) -> &mut Node {
        segments(path).fold(&mut self.root, |node, segment| node.child_mut(segment))
    }

    /// Protects everything at and below `prefix`.
    pub fn guard(&mut self, prefix: &str, requirement: RouteRequirement) {
        let node = self.node_mut(prefix);
        node.requirement = Some(match node.requirement.take() {
            Some(existing) => existing.and(requirement),
            None => requirement,
        });
    }

    pub fn insert(&mut self, page: Page) {
        let path = page.path;
        self.node_mut(path).page = Some(page);
    }

    pub fn resolve(&self, path: &str) -> Option<ResolvedRoute<'_>> {
        let mut node = &self.root;
        let mut requirement = self.root.requirement.clone().unwrap_or(RouteRequirement::Authenticated);
        let mut params = BTreeMap::new();
        for segment in segments(path) {
            node = match node.children.get(segment) {
                Some(exact) => exact,
                None => {
                    let (name, wildcard) = node
                        .children
                        .iter()
                        .find(|(name, _)| name.starts_with(':'))?;
                    params.insert(name.trim_start_matches(':').to_string(), segment.to_string());
                    wildcard
                }
            };
            if let Some(section) = &node.requirement {
                requirement = requirement.and(section.clone());
            }
        }
        let page = node.page.as_ref()?;
        let requirement = requirement
            .and(RouteRequirement::Component(page.component))
            .and(page.requirement.clone());
        trace!(path, page = page.path, "resolved route");
        Some(ResolvedRoute {
            page,
            requirement,
            params,
        })
    }

    pub fn pages(&self) -> Vec<&Page> {
        let mut found = Vec::new();
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            found.extend(node.page.as_ref());
            stack.extend(node.children.values());
        }
        found.sort_by_key(|page| page.path);
        found
    }

    /// Menu entries the user may open.
    pub fn navigation<A: Authorization + ?Sized>(&self, auth: &A) -> Vec<NavItem> {
        self.pages()
            .into_iter()
            .filter(|page| page.in_menu)
            .filter(|page| {
                self.resolve(page.path)
                    .is_some_and(|route| route.requirement.is_satisfied(auth))
            })
            .map(|page| NavItem {
                path: page.path,
                title: page.title,
                component: page.component,
            })
            .collect()
    }
}
