//! Path-based page routing under a base URL.

/// Base URL the app is served under, fixed at build time.
pub const BASE_URL: &str = match option_env!("VUEDRAW_BASE_URL") {
    Some(base) => base,
    None => "/",
};

/// Top-level pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Board,
    About,
    NotFound,
}

/// A path and the page it shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub page: Page,
}

/// The route table.
pub const ROUTES: &[Route] = &[
    Route { path: "/", page: Page::Board },
    Route { path: "/about", page: Page::About },
];

/// Resolves paths to pages.
#[derive(Debug, Clone)]
pub struct Router {
    /// Normalized base: empty for the root, otherwise `/prefix` without a trailing slash.
    base: String,
    routes: Vec<Route>,
}

impl Router {
    pub fn new(base_url: &str, routes: &[Route]) -> Self {
        let trimmed = base_url.trim().trim_matches('/');
        let base = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        };
        Self {
            base,
            routes: routes.to_vec(),
        }
    }

    /// The base URL with a trailing slash.
    pub fn base(&self) -> String {
        format!("{}/", self.base)
    }

    /// Page for `path`. Paths outside the base or not in the table are `NotFound`.
    pub fn resolve(&self, path: &str) -> Page {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let Some(rest) = path.strip_prefix(self.base.as_str()) else {
            return Page::NotFound;
        };
        if !rest.is_empty() && !rest.starts_with('/') {
            // "/appx" is not under "/app".
            return Page::NotFound;
        }
        let rest = rest.trim_end_matches('/');
        let rest = if rest.is_empty() { "/" } else { rest };
        self.routes
            .iter()
            .find(|route| route.path == rest)
            .map_or(Page::NotFound, |route| route.page)
    }

    /// Full path of `page`, if it has a route.
    pub fn href(&self, page: Page) -> Option<String> {
        let route = self.routes.iter().find(|route| route.page == page)?;
        Some(format!("{}{}", self.base, route.path))
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(BASE_URL, ROUTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_at_root() {
        let router = Router::new("/", ROUTES);
        assert_eq!(router.resolve("/"), Page::Board);
        assert_eq!(router.resolve(""), Page::Board);
        assert_eq!(router.resolve("/about"), Page::About);
        assert_eq!(router.resolve("/about/"), Page::About);
        assert_eq!(router.resolve("/missing"), Page::NotFound);
    }

    #[test]
    fn test_resolve_under_base() {
        let router = Router::new("/draw/", ROUTES);
        assert_eq!(router.base(), "/draw/");
        assert_eq!(router.resolve("/draw"), Page::Board);
        assert_eq!(router.resolve("/draw/"), Page::Board);
        assert_eq!(router.resolve("/draw/about"), Page::About);
        assert_eq!(router.resolve("/about"), Page::NotFound);
        assert_eq!(router.resolve("/drawing"), Page::NotFound);
    }

    #[test]
    fn test_query_and_hash_ignored() {
        let router = Router::new("/", ROUTES);
        assert_eq!(router.resolve("/about?tab=1"), Page::About);
        assert_eq!(router.resolve("/#top"), Page::Board);
    }

    #[test]
    fn test_href() {
        let router = Router::new("draw", ROUTES);
        assert_eq!(router.href(Page::About).as_deref(), Some("/draw/about"));
        assert_eq!(router.href(Page::Board).as_deref(), Some("/draw/"));
        assert_eq!(router.href(Page::NotFound), None);
        assert_eq!(Router::new("/", ROUTES).href(Page::Board).as_deref(), Some("/"));
    }
}
