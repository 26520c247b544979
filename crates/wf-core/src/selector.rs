//! Selection expressions for scoping a run to a subset of resources.
//!
//! Supported forms:
//! - `name` - exact resource name
//! - `+name` - resource and all ancestors
//! - `name+` - resource and all descendants
//! - `+name+` - resource, ancestors, and descendants
//! - `tag:daily` - resources with the given tag
//! - `path:models/staging/*` - resources whose file matches a glob

use std::collections::BTreeSet;

use crate::error::{CoreError, CoreResult};
use crate::graph::Graph;
use crate::manifest::Manifest;
use crate::unique_id::UniqueId;

/// A parsed selector expression.
#[derive(Debug, Clone)]
pub enum Selector {
    /// Resource name with optional +prefix/suffix for ancestors/descendants
    Name {
        name: String,
        include_ancestors: bool,
        include_descendants: bool,
    },
    /// Tag-based selection
    Tag { tag: String },
    /// Path-based selection with glob pattern
    Path { pattern: String },
}

impl Selector {
    /// Parse a selector string.
    pub fn parse(selector: &str) -> CoreResult<Self> {
        let selector = selector.trim();

        if let Some(tag) = selector.strip_prefix("tag:") {
            if tag.is_empty() {
                return Err(CoreError::InvalidSelector {
                    selector: selector.to_string(),
                    reason: "tag: selector requires a tag name".to_string(),
                });
            }
            return Ok(Selector::Tag {
                tag: tag.to_string(),
            });
        }

        if let Some(pattern) = selector.strip_prefix("path:") {
            if pattern.is_empty() {
                return Err(CoreError::InvalidSelector {
                    selector: selector.to_string(),
                    reason: "path: selector requires a pattern".to_string(),
                });
            }
            return Ok(Selector::Path {
                pattern: pattern.to_string(),
            });
        }

        let include_ancestors = selector.starts_with('+');
        let include_descendants = selector.ends_with('+');
        let name = selector
            .trim_start_matches('+')
            .trim_end_matches('+')
            .to_string();

        if name.is_empty() {
            return Err(CoreError::InvalidSelector {
                selector: selector.to_string(),
                reason: "resource name cannot be empty".to_string(),
            });
        }

        Ok(Selector::Name {
            name,
            include_ancestors,
            include_descendants,
        })
    }

    /// Resource ids this selector matches.
    pub fn select(&self, manifest: &Manifest, graph: &Graph) -> CoreResult<BTreeSet<UniqueId>> {
        let mut selected = BTreeSet::new();
        match self {
            Selector::Name {
                name,
                include_ancestors,
                include_descendants,
            } => {
                let matches: Vec<UniqueId> = manifest
                    .resources
                    .values()
                    .filter(|r| r.enabled && r.name == *name)
                    .map(|r| r.unique_id.clone())
                    .collect();
                if matches.is_empty() {
                    return Err(CoreError::ResourceNotFound {
                        kind: "resource".to_string(),
                        name: name.clone(),
                    });
                }
                for id in matches {
                    if *include_ancestors {
                        selected.extend(graph.ancestors(&id));
                    }
                    if *include_descendants {
                        selected.extend(graph.descendants(&id));
                    }
                    selected.insert(id);
                }
            }
            Selector::Tag { tag } => {
                selected.extend(
                    manifest
                        .resources
                        .values()
                        .filter(|r| r.enabled && r.tags.iter().any(|t| t == tag))
                        .map(|r| r.unique_id.clone()),
                );
            }
            Selector::Path { pattern } => {
                let glob =
                    glob::Pattern::new(pattern).map_err(|e| CoreError::InvalidSelector {
                        selector: format!("path:{}", pattern),
                        reason: e.to_string(),
                    })?;
                selected.extend(
                    manifest
                        .resources
                        .values()
                        .filter(|r| r.enabled && glob.matches_path(&r.path))
                        .map(|r| r.unique_id.clone()),
                );
            }
        }
        Ok(selected)
    }
}

/// Apply --select / --exclude expressions against the manifest.
///
/// No select expressions means "everything enabled in the graph". Select
/// expressions union; exclude expressions subtract.
pub fn apply_selectors(
    manifest: &Manifest,
    graph: &Graph,
    select: &[String],
    exclude: &[String],
) -> CoreResult<BTreeSet<UniqueId>> {
    let mut selected: BTreeSet<UniqueId> = if select.is_empty() {
        manifest
            .resources
            .values()
            .filter(|r| r.enabled)
            .filter(|r| graph.contains(&r.unique_id))
            .map(|r| r.unique_id.clone())
            .collect()
    } else {
        let mut acc = BTreeSet::new();
        for expr in select {
            acc.extend(Selector::parse(expr)?.select(manifest, graph)?);
        }
        acc
    };

    for expr in exclude {
        let excluded = Selector::parse(expr)?.select(manifest, graph)?;
        selected.retain(|id| !excluded.contains(id));
    }

    if selected.is_empty() {
        return Err(CoreError::EmptySelection {
            selector: select.join(" "),
        });
    }

    Ok(selected)
}

#[cfg(test)]
#[path = "selector_test.rs"]
mod tests;
