//! Resource identifiers and the router that resolves them.
//!
//! Two spellings are accepted for every resource:
//! - bare path: `books`, `books/7`
//! - full URI: `content://com.example.android.inventoryapp/books/7`

use std::fmt;

use crate::error::{Error, Result};

/// Scheme used by the full URI form.
pub const SCHEME: &str = "content";
/// Authority the provider answers for.
pub const AUTHORITY: &str = "com.example.android.inventoryapp";
/// Path segment of the books collection.
pub const PATH_BOOKS: &str = "books";

/// A routed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Every book.
    Collection,
    /// One book by `_id`.
    Item(i64),
}

impl Resource {
    /// Whether a change to `changed` concerns this resource when descendants
    /// are (or are not) of interest.
    pub(crate) fn is_affected_by(&self, changed: &Resource, include_descendants: bool) -> bool {
        match (self, changed) {
            (_, Resource::Collection) => true,
            (Resource::Item(mine), Resource::Item(theirs)) => mine == theirs,
            (Resource::Collection, Resource::Item(_)) => include_descendants,
        }
    }

    /// Full `content://` form.
    pub fn to_uri_string(&self) -> String {
        format!("{SCHEME}://{AUTHORITY}/{self}")
    }

    /// MIME type describing what lives under this resource.
    pub fn mime_type(&self) -> String {
        match self {
            Resource::Collection => format!("vnd.android.cursor.dir/{AUTHORITY}/{PATH_BOOKS}"),
            Resource::Item(_) => format!("vnd.android.cursor.item/{AUTHORITY}/{PATH_BOOKS}"),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Collection => f.write_str(PATH_BOOKS),
            Resource::Item(id) => write!(f, "{PATH_BOOKS}/{id}"),
        }
    }
}

/// What a route pattern resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Collection,
    Item,
}

/// One registered pattern. `#` matches a non-negative integer segment.
#[derive(Debug, Clone)]
struct Route {
    segments: Vec<String>,
    kind: RouteKind,
}

/// Path-pattern matcher. Built once at start-up and handed to the provider.
#[derive(Debug, Clone)]
pub struct Router {
    authority: String,
    routes: Vec<Route>,
}

impl Router {
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            routes: Vec::new(),
        }
    }

    /// The router for the books table: `books` and `books/#`.
    pub fn books() -> Self {
        Self::new(AUTHORITY)
            .route(PATH_BOOKS, RouteKind::Collection)
            .route(&format!("{PATH_BOOKS}/#"), RouteKind::Item)
    }

    pub fn route(mut self, pattern: &str, kind: RouteKind) -> Self {
        let segments = pattern
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        self.routes.push(Route { segments, kind });
        self
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Resolve an identifier, failing with `UnroutableResource` if no route
    /// matches.
    pub fn resolve(&self, uri: &str) -> Result<Resource> {
        let path = self
            .strip_authority(uri)
            .ok_or_else(|| Error::UnroutableResource(uri.to_string()))?;
        // Only `books` and `books/<id>` exist; stray slashes are not normalized.
        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::UnroutableResource(uri.to_string()));
        }

        self.routes
            .iter()
            .find_map(|route| route.matches(&segments))
            .ok_or_else(|| Error::UnroutableResource(uri.to_string()))
    }

    /// Accept `content://<authority>/path` for our authority and bare paths.
    fn strip_authority<'a>(&self, uri: &'a str) -> Option<&'a str> {
        let uri = uri.trim();
        match uri.split_once("://") {
            Some((scheme, rest)) => {
                if scheme != SCHEME {
                    return None;
                }
                let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
                (authority == self.authority).then_some(path)
            }
            None => Some(uri),
        }
    }
}

impl Route {
    fn matches(&self, segments: &[&str]) -> Option<Resource> {
        if segments.len() != self.segments.len() {
            return None;
        }

        let mut id = None;
        for (pattern, segment) in self.segments.iter().zip(segments) {
            if pattern == "#" {
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                id = Some(segment.parse::<i64>().ok()?);
            } else if pattern != segment {
                return None;
            }
        }

        match (self.kind, id) {
            (RouteKind::Collection, _) => Some(Resource::Collection),
            (RouteKind::Item, Some(id)) => Some(Resource::Item(id)),
            (RouteKind::Item, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_paths() {
        let router = Router::books();
        assert_eq!(router.resolve("books").unwrap(), Resource::Collection);
        assert_eq!(router.resolve("books/42").unwrap(), Resource::Item(42));
    }

    #[test]
    fn test_rejects_empty_segments() {
        let router = Router::books();
        for uri in [
            "/books",
            "books/",
            "/books/",
            "books//5",
            "content://com.example.android.inventoryapp/",
            "content://com.example.android.inventoryapp//books",
        ] {
            let err = router.resolve(uri).unwrap_err();
            assert!(matches!(err, Error::UnroutableResource(_)), "{uri}");
        }
    }

    #[test]
    fn test_full_uris() {
        let router = Router::books();
        assert_eq!(
            router
                .resolve("content://com.example.android.inventoryapp/books/3")
                .unwrap(),
            Resource::Item(3)
        );
        assert!(router.resolve("content://someone.else/books").is_err());
        assert!(router
            .resolve("http://com.example.android.inventoryapp/books")
            .is_err());
    }

    #[test]
    fn test_rejects_non_integer_ids() {
        let router = Router::books();
        for uri in ["books/abc", "books/-1", "books/1.5", "books/1/2", "authors", ""] {
            let err = router.resolve(uri).unwrap_err();
            assert!(matches!(err, Error::UnroutableResource(_)), "{uri}");
        }
    }

    #[test]
    fn test_rejects_overflowing_id() {
        assert!(Router::books().resolve("books/99999999999999999999").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        let router = Router::books();
        for resource in [Resource::Collection, Resource::Item(9)] {
            assert_eq!(router.resolve(&resource.to_string()).unwrap(), resource);
            assert_eq!(router.resolve(&resource.to_uri_string()).unwrap(), resource);
        }
    }

    #[test]
    fn test_notification_scope() {
        let collection = Resource::Collection;
        let item = Resource::Item(1);
        assert!(item.is_affected_by(&collection, false));
        assert!(collection.is_affected_by(&item, true));
        assert!(!collection.is_affected_by(&item, false));
        assert!(!item.is_affected_by(&Resource::Item(2), true));
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(
            Resource::Collection.mime_type(),
            "vnd.android.cursor.dir/com.example.android.inventoryapp/books"
        );
        assert!(Resource::Item(1).mime_type().starts_with("vnd.android.cursor.item/"));
    }
}
