//! Macro registry: discovery, fingerprints, and usage attribution.
//!
//! Macro files under the project's macro paths define `{% macro %}` blocks
//! that any resource may call. The registry fingerprints each macro body
//! for the change detector and attributes macro usage to resources by
//! scanning for call sites. Attribution is conservative: a name match in a
//! comment still counts, which only ever widens the reparse set.

use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use wf_core::checksum::compute_checksum;

/// All macros known to the project.
#[derive(Debug, Default)]
pub struct MacroRegistry {
    /// Macro name -> fingerprint of its body
    fingerprints: BTreeMap<String, String>,

    /// Macro name -> other macros its body calls
    uses: BTreeMap<String, BTreeSet<String>>,

    /// Concatenated macro sources, prepended to every render
    prelude: String,
}

impl MacroRegistry {
    /// Build the registry from macro files as (path, contents) pairs.
    pub fn from_files(files: &[(PathBuf, String)]) -> Self {
        let def_re = Regex::new(r"\{%-?\s*macro\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(")
            .expect("macro def regex is valid");
        let end_re = Regex::new(r"\{%-?\s*endmacro\s*-?%\}").expect("endmacro regex is valid");

        let mut bodies: BTreeMap<String, String> = BTreeMap::new();
        for (path, contents) in files {
            for caps in def_re.captures_iter(contents) {
                let name = caps.get(1).expect("group 1 exists").as_str().to_string();
                let start = caps.get(0).expect("group 0 exists").start();
                let body_end = end_re
                    .find_at(contents, start)
                    .map(|m| m.end())
                    .unwrap_or(contents.len());
                if bodies
                    .insert(name.clone(), contents[start..body_end].to_string())
                    .is_some()
                {
                    log::warn!(
                        "macro '{}' redefined in {}; last definition wins",
                        name,
                        path.display()
                    );
                }
            }
        }

        let fingerprints: BTreeMap<String, String> = bodies
            .iter()
            .map(|(name, body)| (name.clone(), compute_checksum(body)))
            .collect();

        let names: Vec<String> = bodies.keys().cloned().collect();
        let uses: BTreeMap<String, BTreeSet<String>> = bodies
            .iter()
            .map(|(name, body)| {
                let called = names
                    .iter()
                    .filter(|other| *other != name && is_called(body, other))
                    .cloned()
                    .collect();
                (name.clone(), called)
            })
            .collect();

        let prelude = files
            .iter()
            .map(|(_, contents)| contents.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            fingerprints,
            uses,
            prelude,
        }
    }

    /// Per-macro body fingerprints for the parse cache.
    pub fn fingerprints(&self) -> &BTreeMap<String, String> {
        &self.fingerprints
    }

    /// Macro sources to prepend to every template render.
    pub fn prelude(&self) -> &str {
        &self.prelude
    }

    /// Whether any macros are defined at all.
    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    /// Macros a raw source text uses, expanded transitively through
    /// macro-to-macro calls.
    pub fn macros_used(&self, raw_sql: &str) -> BTreeSet<String> {
        let mut used: BTreeSet<String> = self
            .fingerprints
            .keys()
            .filter(|name| is_called(raw_sql, name))
            .cloned()
            .collect();

        let mut frontier: Vec<String> = used.iter().cloned().collect();
        while let Some(name) = frontier.pop() {
            if let Some(callees) = self.uses.get(&name) {
                for callee in callees {
                    if used.insert(callee.clone()) {
                        frontier.push(callee.clone());
                    }
                }
            }
        }
        used
    }
}

/// Whether `text` contains a call site of `name` (`name(` as a whole word).
fn is_called(text: &str, name: &str) -> bool {
    let pattern = format!(r"\b{}\s*\(", regex::escape(name));
    Regex::new(&pattern)
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "macros_test.rs"]
mod tests;
