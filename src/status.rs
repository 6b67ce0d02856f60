//! Aggregate status derivation over line-item statuses
use super::error::StatusError;
use super::hierarchy::GroupNode;
use super::record::Record;
use tracing::debug;

pub const IN_PROGRESS: &str = "in-progress";
pub const APPROVED: &str = "approved";
pub const PENDING: &str = "pending";

/// Statuses from strongest to weakest; the last one is the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Precedence(Vec<String>);

impl Precedence {
    pub fn new(order: &[&str]) -> Result<Self, StatusError> {
        if order.is_empty() {
            return Err(StatusError::Empty);
        }
        Ok(Self(order.iter().map(|s| (*s).to_owned()).collect()))
    }
    /// Design approval across a company's products.
    pub fn design() -> Self {
        Self(vec![IN_PROGRESS.into(), APPROVED.into(), PENDING.into()])
    }
    pub fn default_status(&self) -> &str {
        // non-empty by construction
        self.0.last().map_or("", String::as_str)
    }
    pub fn contains(&self, status: &str) -> bool {
        self.0.iter().any(|s| s == status)
    }
    pub fn statuses(&self) -> &[String] {
        &self.0
    }
}

/// First status in `precedence` that any child has, else the default.
/// Unrecognized child values weigh the same as the default.
pub fn derive_status<'p, S: AsRef<str>>(children: &[S], precedence: &'p Precedence) -> &'p str {
    let unknown = unrecognized(children, precedence);
    if !unknown.is_empty() {
        debug!(?unknown, "unrecognized child statuses treated as default");
    }
    precedence
        .statuses()
        .iter()
        .find(|status| children.iter().any(|c| c.as_ref() == status.as_str()))
        .map_or_else(|| precedence.default_status(), String::as_str)
}

/// Child values outside `precedence`, for callers that want to flag them.
pub fn unrecognized<'c, S: AsRef<str>>(children: &'c [S], precedence: &Precedence) -> Vec<&'c str> {
    children
        .iter()
        .map(AsRef::as_ref)
        .filter(|c| !precedence.contains(c))
        .collect()
}

impl GroupNode<Record> {
    /// Derived status over every line item of every record under this node.
    pub fn derived_status<'p>(&self, precedence: &'p Precedence) -> &'p str {
        let children: Vec<&str> = self
            .records()
            .into_iter()
            .flat_map(|r| r.child_statuses.iter().map(String::as_str))
            .collect();
        derive_status(&children, precedence)
    }
}

impl Record {
    pub fn derived_status<'p>(&self, precedence: &'p Precedence) -> &'p str {
        derive_status(&self.child_statuses, precedence)
    }
}
