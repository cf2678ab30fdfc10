//! Instance selectors.
//!
//! Selectors are plain values combined with an explicit all-of combinator.
//! The ownership selector is what keeps foreign instances away from the
//! orchestration host, which destroys anything it cannot account for.

use std::collections::BTreeSet;

use crate::instance::{Instance, InstanceId};

/// Tag carried by control-tier instances in addition to the ownership tag.
pub const CONTROLLER_TAG: &str = "controller";

/// A single predicate over an [`Instance`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Selector {
    /// Passes when the environment's ownership tag is present.
    Ownership {
        /// Environment UUID rendered as a tag.
        tag: String,
    },
    /// Passes when the instance id is one of `ids`.
    IdMembership {
        /// Accepted identifiers.
        ids: BTreeSet<InstanceId>,
    },
    /// Passes when an arbitrary tag is present.
    Tag {
        /// Tag that must be present.
        tag: String,
    },
}

impl Selector {
    /// Selector matching instances owned by the environment tagged `tag`.
    #[must_use]
    pub fn ownership(tag: impl Into<String>) -> Self {
        Self::Ownership { tag: tag.into() }
    }

    /// Selector matching any of `ids`.
    ///
    /// Returns `None` for an empty id list: no id filter means "all", never
    /// "nothing".
    #[must_use]
    pub fn id_membership(ids: &[InstanceId]) -> Option<Self> {
        if ids.is_empty() {
            return None;
        }
        Some(Self::IdMembership {
            ids: ids.iter().cloned().collect(),
        })
    }

    /// Selector matching instances carrying `tag`.
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self::Tag { tag: tag.into() }
    }

    /// Selector matching control-tier instances.
    #[must_use]
    pub fn controller() -> Self {
        Self::tag(CONTROLLER_TAG)
    }

    /// Evaluates the selector against one instance.
    #[must_use]
    pub fn matches(&self, instance: &Instance) -> bool {
        match self {
            Self::Ownership { tag } | Self::Tag { tag } => instance.has_tag(tag),
            Self::IdMembership { ids } => ids.contains(&instance.id),
        }
    }
}

/// Conjunction of selectors.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Selectors(Vec<Selector>);

impl Selectors {
    /// Starts an empty conjunction, which accepts every instance.
    #[must_use]
    pub const fn all_of() -> Self {
        Self(Vec::new())
    }

    /// Adds a selector to the conjunction.
    #[must_use]
    pub fn and(mut self, selector: Selector) -> Self {
        self.0.push(selector);
        self
    }

    /// Adds a selector when one is present.
    #[must_use]
    pub fn and_maybe(self, selector: Option<Selector>) -> Self {
        match selector {
            Some(inner) => self.and(inner),
            None => self,
        }
    }

    /// Returns true when every selector passes, stopping at the first failure.
    #[must_use]
    pub fn matches(&self, instance: &Instance) -> bool {
        self.0.iter().all(|selector| selector.matches(instance))
    }

    /// Keeps the instances passing every selector, in input order.
    #[must_use]
    pub fn select(&self, instances: Vec<Instance>) -> Vec<Instance> {
        instances
            .into_iter()
            .filter(|instance| self.matches(instance))
            .collect()
    }
}

/// Extracts identifiers, preserving order.
#[must_use]
pub fn ids_of(instances: &[Instance]) -> Vec<InstanceId> {
    instances.iter().map(|instance| instance.id.clone()).collect()
}
