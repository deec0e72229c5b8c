//! Collection name sanitization for MongoDB compatibility.
//!
//! MongoDB namespaces are `<database>.<collection>`, and collection names may not contain
//! dollar signs or null bytes. Configured names are rewritten before they reach the driver
//! so that a stray character cannot address a different namespace. Field names and values
//! are stored unchanged.

/// Rewrites collection names into a form MongoDB accepts.
pub(crate) struct CollectionName;

impl CollectionName {
    /// Character replacements for sanitization
    const REPLACEMENTS: [(&'static str, &'static str); 3] = [
        (".", "__dot__"),
        ("$", "__dollar__"),
        ("\0", "__null__"),
    ];

    /// Replaces problematic characters with safe escaped versions.
    pub(crate) fn sanitize(input: &str) -> String {
        let mut sanitized = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter() {
            sanitized = sanitized.replace(*target, *replacement);
        }
        sanitized
    }

    /// Reverts [`sanitize`](Self::sanitize), for names listed by the server.
    pub(crate) fn restore(input: &str) -> String {
        let mut restored = input.to_string();
        for (target, replacement) in Self::REPLACEMENTS.iter().rev() {
            restored = restored.replace(*replacement, *target);
        }
        restored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_untouched() {
        assert_eq!(CollectionName::sanitize("fanfictions"), "fanfictions");
    }

    #[test]
    fn reserved_characters_are_escaped_and_restored() {
        let sanitized = CollectionName::sanitize("stories.$draft");

        assert_eq!(sanitized, "stories__dot____dollar__draft");
        assert_eq!(CollectionName::restore(&sanitized), "stories.$draft");
    }
}
