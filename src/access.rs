// Injected evaluation capabilities: access control and the backend
// hasSubordinates probe. Both are trait objects so deployments plug in
// their real implementations and tests use deterministic fakes.

use crate::entry::Entry;
use crate::schema::AttributeType;
use std::collections::HashSet;

/// SEARCH-access decision for one attribute (optionally one value) of an
/// entry. A denial surfaces as `EvalError::InsufficientAccess`, never as a
/// silent False.
pub trait AccessControl: Send + Sync {
    fn search_allowed(
        &self,
        entry: &Entry,
        attr: &AttributeType,
        value: Option<&[u8]>,
    ) -> bool;
}

/// Default policy when no access control is wired in.
pub struct AllowAll;

impl AccessControl for AllowAll {
    fn search_allowed(&self, _: &Entry, _: &AttributeType, _: Option<&[u8]>) -> bool {
        true
    }
}

/// Deny-list policy keyed by attribute name or OID.
pub struct DenyAttrs {
    denied: HashSet<String>,
}

impl DenyAttrs {
    pub fn new<I: IntoIterator<Item = S>, S: AsRef<str>>(attrs: I) -> Self {
        Self {
            denied: attrs
                .into_iter()
                .map(|a| a.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl AccessControl for DenyAttrs {
    fn search_allowed(&self, _: &Entry, attr: &AttributeType, _: Option<&[u8]>) -> bool {
        if self.denied.contains(&attr.oid.to_ascii_lowercase()) {
            return false;
        }
        !attr
            .names
            .iter()
            .any(|n| self.denied.contains(&n.to_ascii_lowercase()))
    }
}

/// Backend capability answering whether an entry has children. The engine
/// treats the capability's mere availability as significant for presence
/// filters, separately from the per-entry answer.
pub trait SubordinatesProbe: Send + Sync {
    fn has_subordinates(&self, entry: &Entry) -> bool;
}
