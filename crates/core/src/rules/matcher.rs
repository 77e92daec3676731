use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::page::get_host;
use crate::rules::selector::{Selector, parse_selector};

/// Wildcard key matching any hostname, element name, or class token.
const WILDCARD: &str = "*";

/// The suppression rules resolved for one page.
///
/// Built fresh for every rewrite call: different origin URLs select
/// different rule-file entries, so nothing is cached across calls.
#[derive(Debug, Clone, Default)]
pub struct HiddenRules {
    /// `id` attribute values that suppress their element and descendants.
    ids: HashSet<String>,
    /// Element name (or `*`) to class tokens (or `*`) that suppress matching
    /// elements and their descendants.
    tags: HashMap<String, HashSet<String>>,
}

impl HiddenRules {
    /// Load the rules that apply to `url` from the JSON rule file at `path`.
    ///
    /// A missing path is the valid no-suppression default.
    pub fn load(path: Option<&Path>, url: &str) -> Result<HiddenRules> {
        let Some(path) = path else {
            return Ok(HiddenRules::default());
        };
        let data = fs::read_to_string(path)?;
        Self::parse(&data, url)
    }

    /// Parse a rule document and keep the entries whose host pattern matches
    /// the host of `url`.
    ///
    /// An entry applies when its key is `*`, equals the host exactly, or is a
    /// dot-suffix of it; all applicable entries are unioned.
    pub fn parse(data: &str, url: &str) -> Result<HiddenRules> {
        let entries: HashMap<String, Vec<String>> = serde_json::from_str(data)?;
        let host = get_host(url);

        let mut rules = HiddenRules::default();
        for (pattern, selectors) in &entries {
            if !host_matches(&host, pattern) {
                continue;
            }
            for raw in selectors {
                match parse_selector(raw)? {
                    Selector::Id(id) => {
                        rules.ids.insert(id);
                    }
                    Selector::Tag { element, class } => {
                        rules.tags.entry(element).or_default().insert(class);
                    }
                }
            }
        }
        Ok(rules)
    }

    /// Report whether a tag token should be suppressed together with its
    /// descendants.
    ///
    /// Class matching is token-wise against the whitespace-split `class`
    /// attribute value, never substring matching.
    pub fn should_hide(&self, tag: &str, id: &str, classes: &str) -> bool {
        if !id.is_empty() && self.ids.contains(id) {
            return true;
        }
        if let Some(hidden) = self.tags.get(tag)
            && class_matches(hidden, classes)
        {
            return true;
        }
        if let Some(hidden) = self.tags.get(WILDCARD)
            && class_matches(hidden, classes)
        {
            return true;
        }
        false
    }

    /// True when no selector survived host resolution.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.tags.is_empty()
    }
}

fn class_matches(hidden: &HashSet<String>, classes: &str) -> bool {
    hidden.contains(WILDCARD) || classes.split_whitespace().any(|c| hidden.contains(c))
}

fn host_matches(host: &str, pattern: &str) -> bool {
    pattern == WILDCARD || host == pattern || host.ends_with(&format!(".{pattern}"))
}
