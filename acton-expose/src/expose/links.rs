//! RFC 5988 `Link` header assembly

use std::fmt;

use super::pagination::PaginationInfo;

/// One `Link` header entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    url: String,
    rel: String,
    attributes: Vec<(String, String)>,
}

impl Link {
    /// Create a link with a relation
    pub fn new(rel: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            rel: rel.into(),
            attributes: Vec::new(),
        }
    }

    /// Add an attribute rendered after `rel`
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    /// Add several attributes
    #[must_use]
    pub fn with_attributes(mut self, attributes: &[(String, String)]) -> Self {
        self.attributes.extend_from_slice(attributes);
        self
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Relation
    pub fn rel(&self) -> &str {
        &self.rel
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>; rel=\"{}\"", self.url, self.rel)?;
        for (key, value) in &self.attributes {
            write!(f, "; {}=\"{}\"", key, value)?;
        }
        Ok(())
    }
}

/// Insertion-ordered, deduplicated set of links
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    links: Vec<Link>,
}

impl LinkSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a link, ignoring exact duplicates
    ///
    /// Returns whether the link was added.
    pub fn push(&mut self, link: Link) -> bool {
        if self.links.contains(&link) {
            return false;
        }
        self.links.push(link);
        true
    }

    /// Add several links in order
    pub fn extend(&mut self, links: impl IntoIterator<Item = Link>) {
        for link in links {
            self.push(link);
        }
    }

    /// Links in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Number of links
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Comma-joined header value, `None` when empty
    pub fn header_value(&self) -> Option<String> {
        if self.links.is_empty() {
            return None;
        }
        Some(
            self.links
                .iter()
                .map(Link::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

/// Pagination links in `first`, `prev`, `next`, `last` order
///
/// A relation is emitted only when its page exists and `page_url` returns a
/// non-empty URL for it.
pub fn pagination_links<F>(
    info: &PaginationInfo,
    page_url: F,
    attributes: &[(String, String)],
) -> LinkSet
where
    F: Fn(u64) -> Option<String>,
{
    let relations = [
        ("first", info.first_page()),
        ("prev", info.previous_page),
        ("next", info.next_page),
        ("last", info.last_page()),
    ];

    let mut links = LinkSet::new();
    for (rel, page) in relations {
        let Some(page) = page else { continue };
        match page_url(page) {
            Some(url) if !url.is_empty() => {
                links.push(Link::new(rel, url).with_attributes(attributes));
            }
            _ => {}
        }
    }
    links
}
