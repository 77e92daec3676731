use crate::error::{Result, SatchelError};

/// A single suppression selector from the hidden-tag rule file.
///
/// The grammar is deliberately tiny: `#id`, `element`, or `element.class`.
/// A bare `element` is shorthand for `element.*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// `#id`: hide the element carrying this id attribute value.
    Id(String),
    /// `element.class`: hide elements by name and class token. Either part
    /// may be the wildcard `*`.
    Tag { element: String, class: String },
}

/// Parse one selector string.
///
/// Anything outside the three supported forms is a format error; a rule that
/// cannot be parsed fails the whole load rather than being guessed at.
pub fn parse_selector(raw: &str) -> Result<Selector> {
    if let Some(id) = raw.strip_prefix('#') {
        if id.is_empty() || id.contains('.') {
            return Err(SatchelError::Rules(format!("expected #id, element, or element.class in {raw:?}")));
        }
        return Ok(Selector::Id(id.to_string()));
    }

    let mut parts = raw.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(element), None, None) if !element.is_empty() => Ok(Selector::Tag {
            element: element.to_string(),
            class: "*".to_string(),
        }),
        (Some(element), Some(class), None) if !element.is_empty() && !class.is_empty() => Ok(Selector::Tag {
            element: element.to_string(),
            class: class.to_string(),
        }),
        _ => Err(SatchelError::Rules(format!("expected #id, element, or element.class in {raw:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_selector("#comments").unwrap(), Selector::Id("comments".to_string()));
    }

    #[test]
    fn test_parse_element_class() {
        assert_eq!(
            parse_selector("div.ads").unwrap(),
            Selector::Tag { element: "div".to_string(), class: "ads".to_string() }
        );
    }

    #[test]
    fn test_parse_bare_element_is_wildcard_class() {
        assert_eq!(
            parse_selector("aside").unwrap(),
            Selector::Tag { element: "aside".to_string(), class: "*".to_string() }
        );
    }

    #[test]
    fn test_parse_wildcard_element() {
        assert_eq!(
            parse_selector("*.share-icons").unwrap(),
            Selector::Tag { element: "*".to_string(), class: "share-icons".to_string() }
        );
    }

    #[test]
    fn test_parse_malformed() {
        for raw in ["", "#", "a.b.c", ".ads", "div.", "#a.b"] {
            assert!(parse_selector(raw).is_err(), "expected error for {raw:?}");
        }
    }
}
