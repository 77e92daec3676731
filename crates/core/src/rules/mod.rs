//! Site-scoped suppression rules for the content rewriter.
//!
//! A rule file is a JSON object keyed by hostname patterns; each value is a
//! list of selectors naming elements to strip from rewritten pages along with
//! their descendants. Rules are resolved per page URL and rebuilt for every
//! rewrite call.

pub mod matcher;
pub mod selector;

pub use matcher::HiddenRules;
pub use selector::Selector;
