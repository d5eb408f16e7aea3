//! Error kind descriptors

use axum::http::StatusCode;
use std::fmt;
use std::sync::Arc;

/// Name of the root kind every other kind descends from
pub const ROOT_KIND: &str = "unknown";

/// A named, status-bearing classification for an error condition
///
/// Kinds are immutable once built. A child holds its parent by `Arc`, so
/// building a child with a different status never touches the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorKind {
    name: String,
    registered_as: String,
    http_status: Option<StatusCode>,
    parent: Option<Arc<ErrorKind>>,
    display_name: Option<String>,
}

impl ErrorKind {
    /// Create a kind with no explicit status and no parent
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            registered_as: name.clone(),
            name,
            http_status: None,
            parent: None,
            display_name: None,
        }
    }

    /// The built-in root kind (`unknown`, 400)
    pub fn root() -> Self {
        Self::new(ROOT_KIND).with_status(StatusCode::BAD_REQUEST)
    }

    /// Set an explicit HTTP status
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Attach a parent kind
    #[must_use]
    pub fn with_parent(mut self, parent: Arc<ErrorKind>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set a human readable default message
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Publish under a different envelope name than the registration key
    #[must_use]
    pub fn with_error_name(mut self, error_name: impl Into<String>) -> Self {
        self.name = error_name.into();
        self
    }

    /// Name emitted in `body.error`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key the kind was registered under
    pub fn registered_as(&self) -> &str {
        &self.registered_as
    }

    /// Status set on this kind itself, ignoring ancestors
    pub fn explicit_status(&self) -> Option<StatusCode> {
        self.http_status
    }

    /// Effective HTTP status
    ///
    /// Walks the parent chain to the nearest explicit status. A chain with
    /// none resolves to 400, the root's status.
    pub fn http_status(&self) -> StatusCode {
        self.lineage()
            .find_map(|kind| kind.http_status)
            .unwrap_or(StatusCode::BAD_REQUEST)
    }

    /// Direct parent, if any
    pub fn parent(&self) -> Option<&Arc<ErrorKind>> {
        self.parent.as_ref()
    }

    /// This kind followed by every ancestor, nearest first
    pub fn lineage(&self) -> impl Iterator<Item = &ErrorKind> {
        std::iter::successors(Some(self), |kind| kind.parent.as_deref())
    }

    /// Whether this kind is `name` or descends from it
    pub fn is_a(&self, name: &str) -> bool {
        self.lineage()
            .any(|kind| kind.name == name || kind.registered_as == name)
    }

    /// Default human readable message
    ///
    /// Falls back to the humanized name: `invalid_resource` becomes
    /// `Invalid resource`.
    pub fn display_name(&self) -> String {
        match &self.display_name {
            Some(display) => display.clone(),
            None => humanize(&self.name),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn humanize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
