//! Resource identity types.
//!
//! Every resource is addressed by a [`UniqueId`] of the form
//! `kind.project.name` (e.g. `model.jaffle.customers`). The id is stable
//! across runs and is the key of the manifest, the graph, and the reparse
//! cache.

use crate::newtype_string::define_newtype_string;
use crate::resource::ResourceKind;

define_newtype_string! {
    /// Namespace-qualified resource id: `kind.project.name`.
    pub struct UniqueId;
}

define_newtype_string! {
    /// Bare resource name as declared in the project (file stem or YAML name).
    pub struct ResourceName;
}

define_newtype_string! {
    /// Name of a macro defined under the project's macro paths.
    pub struct MacroName;
}

impl UniqueId {
    /// Build a unique id from its parts.
    pub fn from_parts(kind: ResourceKind, project: &str, name: &str) -> Self {
        Self::new(format!("{}.{}.{}", kind, project, name))
    }

    /// The `kind` segment, if the id is well formed.
    pub fn kind(&self) -> Option<ResourceKind> {
        self.as_str().split('.').next().and_then(ResourceKind::parse)
    }

    /// The trailing `name` segment (everything after the second dot).
    pub fn name(&self) -> &str {
        let mut parts = self.as_str().splitn(3, '.');
        parts.next();
        parts.next();
        parts.next().unwrap_or(self.as_str())
    }
}

#[cfg(test)]
#[path = "unique_id_test.rs"]
mod tests;
