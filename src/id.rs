//! Identifier sanitization and hyperlink rewriting
//!
//! Every identifier in the merged document is derived from the path of the
//! document that declared it plus its original value, both passed through
//! [`sanitize`]. Hyperlinks are rewritten by recomputing the same name
//! independently, so a link never consults the renames actually chosen for
//! its target document.

use std::collections::HashSet;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::vocab::{
    DISAMBIGUATION_SUFFIX, EXTERNAL_SCHEMES, ID_SEPARATOR, MARKUP_EXTENSIONS, SANITIZED_PREFIX,
};

/// Bytes left unescaped by form-style escaping: alphanumerics, `_ . - ~`
/// and space (turned into `+` afterwards)
const FORM_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b' ');

/// Turn a path or identifier into a token that is safe inside an `id`
///
/// Strips a trailing `.xhtml`/`.html` and a leading `./`, form-escapes the
/// rest, replaces `. , + %` with `_` and prepends `s_`.
///
/// Not idempotent: sanitizing an already sanitized token only adds another
/// prefix, `sanitize(sanitize(x)) == "s_" + sanitize(x)`.
pub fn sanitize(token: &str) -> String {
    let stem = strip_markup_extension(token);
    let stem = stem.strip_prefix("./").unwrap_or(stem);

    let escaped = utf8_percent_encode(stem, FORM_ESCAPE)
        .to_string()
        .replace(' ', "+");

    let body: String = escaped
        .chars()
        .map(|c| match c {
            '.' | ',' | '+' | '%' => '_',
            other => other,
        })
        .collect();

    format!("{}{}", SANITIZED_PREFIX, body)
}

fn strip_markup_extension(token: &str) -> &str {
    MARKUP_EXTENSIONS
        .iter()
        .find_map(|ext| token.strip_suffix(ext))
        .unwrap_or(token)
}

/// Composite identifier for `id` declared inside `doc_path`
pub fn qualified_id(doc_path: &str, id: &str) -> String {
    format!("{}{}{}", sanitize(doc_path), ID_SEPARATOR, sanitize(id))
}

/// Classification of a hyperlink target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HrefKind<'a> {
    /// Explicit external scheme: "http:", "mailto:", ...
    External,
    /// Fragment only: "#note1"
    SameDocument { fragment: &'a str },
    /// File and fragment: "ch2.xhtml#note1"
    CrossDocument { file: &'a str, fragment: &'a str },
    /// File only: "ch2.xhtml" (empty for a bare "")
    WholeDocument { file: &'a str },
}

/// Classify an href value, splitting on the first `#`
pub fn classify_href(href: &str) -> HrefKind<'_> {
    if EXTERNAL_SCHEMES.iter().any(|scheme| href.starts_with(scheme)) {
        return HrefKind::External;
    }

    match href.split_once('#') {
        Some(("", fragment)) => HrefKind::SameDocument { fragment },
        Some((file, fragment)) => HrefKind::CrossDocument { file, fragment },
        None => HrefKind::WholeDocument { file: href },
    }
}

/// Rewrite an href found in `current_doc` into a same-document reference
///
/// Returns `None` for external links, which are kept byte for byte.
pub fn rewrite_href(href: &str, current_doc: &str) -> Option<String> {
    let target = match classify_href(href) {
        HrefKind::External => return None,
        HrefKind::SameDocument { fragment } => qualified_id(current_doc, fragment),
        HrefKind::CrossDocument { file, fragment } => qualified_id(file, fragment),
        // An empty href means the current document; sanitizing the empty
        // file part would give the bare prefix `#s_` instead
        HrefKind::WholeDocument { file } if file.is_empty() => sanitize(current_doc),
        HrefKind::WholeDocument { file } => sanitize(file),
    };
    Some(format!("#{}", target))
}

/// Identifiers already emitted during one merge
///
/// Created empty per merge and only ever grows.
#[derive(Debug, Default)]
pub struct IdentifierMap {
    taken: HashSet<String>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `candidate`, appending `E` until it is unused
    ///
    /// # Returns
    /// The identifier actually recorded and whether it had to be changed
    pub fn claim(&mut self, candidate: String) -> (String, bool) {
        let mut id = candidate;
        let mut disambiguated = false;
        while self.taken.contains(&id) {
            id.push(DISAMBIGUATION_SUFFIX);
            disambiguated = true;
        }
        self.taken.insert(id.clone());
        (id, disambiguated)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.taken.contains(id)
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_strips_extension_and_dot_slash() {
        assert_eq!(sanitize("ch1.xhtml"), "s_ch1");
        assert_eq!(sanitize("ch1.html"), "s_ch1");
        assert_eq!(sanitize("./ch1.xhtml"), "s_ch1");
        assert_eq!(sanitize("x"), "s_x");
    }

    #[test]
    fn test_sanitize_escapes_and_replaces() {
        assert_eq!(sanitize("Text/ch1.xhtml"), "s_Text_2Fch1");
        assert_eq!(sanitize("a.b,c"), "s_a_b_2Cc");
        assert_eq!(sanitize("two words"), "s_two_words");
        assert_eq!(sanitize("a+b"), "s_a_2Bb");
        assert_eq!(sanitize("100%"), "s_100_25");
        assert_eq!(sanitize("keep-this_~"), "s_keep-this_~");
        assert_eq!(sanitize("é"), "s__C3_A9");
    }

    #[test]
    fn test_sanitize_extension_only_at_end() {
        assert_eq!(sanitize("ch1.xhtml.bak"), "s_ch1_xhtml_bak");
        assert_eq!(sanitize("ch1.XHTML"), "s_ch1_XHTML");
    }

    #[test]
    fn test_sanitize_twice_doubles_prefix() {
        let once = sanitize("Text/ch 1.xhtml");
        assert_eq!(sanitize(&once), format!("s_{}", once));
    }

    proptest! {
        #[test]
        fn prop_sanitize_twice_only_adds_prefix(token in "\\PC{0,24}") {
            let once = sanitize(&token);
            prop_assert_eq!(sanitize(&once), format!("{}{}", SANITIZED_PREFIX, once));
        }

        #[test]
        fn prop_sanitized_body_is_id_safe(token in "\\PC{0,24}") {
            let sanitized = sanitize(&token);
            prop_assert!(sanitized.starts_with(SANITIZED_PREFIX));
            prop_assert!(sanitized
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '~')));
        }
    }

    #[test]
    fn test_qualified_id() {
        assert_eq!(qualified_id("ch1.xhtml", "x"), "s_ch1_s_x");
        assert_eq!(qualified_id("ch2.xhtml", "y"), "s_ch2_s_y");
    }

    #[test]
    fn test_classify_href() {
        assert_eq!(classify_href("http://example.com"), HrefKind::External);
        assert_eq!(classify_href("mailto:a@b.c"), HrefKind::External);
        assert_eq!(classify_href("ftps:host"), HrefKind::External);
        assert_eq!(
            classify_href("#note"),
            HrefKind::SameDocument { fragment: "note" }
        );
        assert_eq!(
            classify_href("ch2.xhtml#y"),
            HrefKind::CrossDocument {
                file: "ch2.xhtml",
                fragment: "y"
            }
        );
        assert_eq!(
            classify_href("ch2.xhtml#a#b"),
            HrefKind::CrossDocument {
                file: "ch2.xhtml",
                fragment: "a#b"
            }
        );
        assert_eq!(
            classify_href("ch2.xhtml"),
            HrefKind::WholeDocument { file: "ch2.xhtml" }
        );
    }

    #[test]
    fn test_scheme_check_is_case_sensitive() {
        assert_ne!(classify_href("HTTP://example.com"), HrefKind::External);
    }

    #[test]
    fn test_rewrite_href() {
        assert_eq!(rewrite_href("http://example.com", "ch1.xhtml"), None);
        assert_eq!(
            rewrite_href("#x", "ch1.xhtml"),
            Some("#s_ch1_s_x".to_string())
        );
        assert_eq!(
            rewrite_href("ch2.xhtml#y", "ch1.xhtml"),
            Some("#s_ch2_s_y".to_string())
        );
        assert_eq!(
            rewrite_href("ch2.xhtml", "ch1.xhtml"),
            Some("#s_ch2".to_string())
        );
        assert_eq!(rewrite_href("", "ch1.xhtml"), Some("#s_ch1".to_string()));
        assert_eq!(rewrite_href("#", "ch1.xhtml"), Some("#s_ch1_s_".to_string()));
    }

    #[test]
    fn test_empty_href_targets_current_section() {
        assert_eq!(rewrite_href("", "Text/ch1.xhtml"), Some("#s_Text_2Fch1".to_string()));
        assert_ne!(rewrite_href("", "ch1.xhtml"), Some("#s_".to_string()));
    }

    #[test]
    fn test_identifier_map_disambiguates() {
        let mut ids = IdentifierMap::new();

        let (first, changed) = ids.claim("s_doc_s_dup".to_string());
        assert_eq!(first, "s_doc_s_dup");
        assert!(!changed);

        let (second, changed) = ids.claim("s_doc_s_dup".to_string());
        assert_eq!(second, "s_doc_s_dupE");
        assert!(changed);

        let (third, _) = ids.claim("s_doc_s_dup".to_string());
        assert_eq!(third, "s_doc_s_dupEE");

        assert_eq!(ids.len(), 3);
        assert!(ids.contains("s_doc_s_dupE"));
    }
}
