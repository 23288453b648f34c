//! Per-document rewriting
//!
//! Turns one source document into a `<section>` holding its body content,
//! with every identifier renamed to a globally unique value and every
//! internal hyperlink pointed at the renamed target.

use serde::Serialize;

use crate::error::MergeError;
use crate::id::{qualified_id, rewrite_href, sanitize, IdentifierMap};
use crate::markup::{Attribute, Document, Element};
use crate::vocab::{CONTENT_ROOT, LINK_TAG, SECTION_TAG};

/// One identifier as declared and as emitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierRename {
    pub original: String,
    pub rewritten: String,
}

/// Content of one document, ready to be concatenated
#[derive(Debug, Clone)]
pub struct RewrittenFragment {
    pub doc_path: String,
    pub section_id: String,
    /// Serialized `<section>` element
    pub markup: String,
    /// Renames in document order
    pub identifiers: Vec<IdentifierRename>,
    /// Identifiers that needed a disambiguating suffix
    pub disambiguated: usize,
    pub links_rewritten: usize,
    pub external_links: usize,
}

/// Rewrite a document, claiming its section identifier in `ids`
pub fn rewrite(
    doc_path: &str,
    doc_text: &str,
    ids: &mut IdentifierMap,
) -> Result<RewrittenFragment, MergeError> {
    let (section_id, _) = ids.claim(sanitize(doc_path));
    rewrite_section(doc_path, doc_text, section_id, ids)
}

/// Rewrite a document whose section identifier was already claimed
///
/// # Arguments
/// * `doc_path` - Manifest href of the document; all names derive from it
/// * `doc_text` - Raw document markup
/// * `section_id` - Identifier of the wrapping `<section>`
/// * `ids` - Identifiers emitted so far in this merge
pub fn rewrite_section(
    doc_path: &str,
    doc_text: &str,
    section_id: String,
    ids: &mut IdentifierMap,
) -> Result<RewrittenFragment, MergeError> {
    let mut document = Document::parse(doc_text).map_err(|e| MergeError::malformed(doc_path, e))?;

    // Prefixed namespaces declared above the content would be lost with the wrapper
    let inherited: Vec<Attribute> = document
        .root()
        .into_iter()
        .chain(document.elements_matching(is_content_root).take(1))
        .flat_map(|el| el.attributes.iter())
        .filter(|a| a.name.starts_with("xmlns:"))
        .cloned()
        .collect();

    let content_root = document
        .find_mut(|el| is_content_root(&el))
        .ok_or_else(|| MergeError::malformed(doc_path, format!("no <{}> element", CONTENT_ROOT)))?;

    let mut section = Element::new(SECTION_TAG);
    section.set_attr("id", &section_id);
    for attr in inherited {
        if section.attr(&attr.name).is_none() {
            section.attributes.push(attr);
        }
    }
    section.children = std::mem::take(&mut content_root.children);

    let mut fragment = RewrittenFragment {
        doc_path: doc_path.to_string(),
        section_id,
        markup: String::new(),
        identifiers: Vec::new(),
        disambiguated: 0,
        links_rewritten: 0,
        external_links: 0,
    };

    // Identifiers first, then links: same-document links are derived from
    // the original value, never from the claimed one
    section.for_each_descendant_mut(&mut |el: &mut Element| {
        let Some(original) = el.attr("id").map(|v| v.into_owned()) else {
            return;
        };
        let (rewritten, changed) = ids.claim(qualified_id(doc_path, &original));
        if changed {
            tracing::warn!(
                doc = %doc_path,
                id = %original,
                rewritten = %rewritten,
                "identifier collision, disambiguated"
            );
            fragment.disambiguated += 1;
        }
        el.set_attr("id", &rewritten);
        fragment.identifiers.push(IdentifierRename {
            original,
            rewritten,
        });
    });

    section.for_each_descendant_mut(&mut |el: &mut Element| {
        if el.local_name() != LINK_TAG {
            return;
        }
        let Some(href) = el.attr("href").map(|v| v.into_owned()) else {
            return;
        };
        match rewrite_href(&href, doc_path) {
            Some(target) => {
                el.set_attr("href", &target);
                fragment.links_rewritten += 1;
            }
            None => fragment.external_links += 1,
        }
    });

    fragment.markup = section
        .to_xml()
        .map_err(|e| MergeError::malformed(doc_path, e))?;

    tracing::debug!(
        doc = %doc_path,
        section = %fragment.section_id,
        identifiers = fragment.identifiers.len(),
        links = fragment.links_rewritten,
        "rewrote document"
    );

    Ok(fragment)
}

fn is_content_root(el: &&Element) -> bool {
    el.local_name() == CONTENT_ROOT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xhtml(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title id="t">T</title></head><body id="top">{}</body></html>"#,
            body
        )
    }

    #[test]
    fn test_rewrite_identifiers_and_links() {
        let mut ids = IdentifierMap::new();
        let doc = xhtml(r##"<div id="x">see <a href="ch2.xhtml#y">this</a> and <a href="#x">that</a></div>"##);

        let fragment = rewrite("ch1.xhtml", &doc, &mut ids).unwrap();

        assert_eq!(fragment.section_id, "s_ch1");
        assert_eq!(
            fragment.markup,
            r##"<section id="s_ch1"><div id="s_ch1_s_x">see <a href="#s_ch2_s_y">this</a> and <a href="#s_ch1_s_x">that</a></div></section>"##
        );
        assert_eq!(fragment.links_rewritten, 2);
        assert_eq!(fragment.external_links, 0);
        assert_eq!(
            fragment.identifiers,
            vec![IdentifierRename {
                original: "x".to_string(),
                rewritten: "s_ch1_s_x".to_string()
            }]
        );
    }

    #[test]
    fn test_head_and_body_ids_are_not_claimed() {
        let mut ids = IdentifierMap::new();
        rewrite("ch1.xhtml", &xhtml("<p>plain</p>"), &mut ids).unwrap();
        assert!(ids.contains("s_ch1"));
        assert!(!ids.contains("s_ch1_s_t"));
        assert!(!ids.contains("s_ch1_s_top"));
    }

    #[test]
    fn test_duplicate_ids_disambiguated() {
        let mut ids = IdentifierMap::new();
        let doc = xhtml(r#"<p id="dup">a</p><p id="dup">b</p>"#);

        let fragment = rewrite("doc.xhtml", &doc, &mut ids).unwrap();

        assert!(fragment.markup.contains(r#"<p id="s_doc_s_dup">a</p>"#));
        assert!(fragment.markup.contains(r#"<p id="s_doc_s_dupE">b</p>"#));
        assert_eq!(fragment.disambiguated, 1);
    }

    #[test]
    fn test_sanitize_collision_disambiguated() {
        let mut ids = IdentifierMap::new();
        // "a.b" and "a,b" escape differently, "a.b" and "a_b" do not
        let doc = xhtml(r#"<p id="a.b">1</p><p id="a_b">2</p>"#);

        let fragment = rewrite("c.xhtml", &doc, &mut ids).unwrap();

        let rewritten: Vec<&str> = fragment
            .identifiers
            .iter()
            .map(|r| r.rewritten.as_str())
            .collect();
        assert_eq!(rewritten, vec!["s_c_s_a_b", "s_c_s_a_bE"]);
    }

    #[test]
    fn test_external_links_untouched() {
        let mut ids = IdentifierMap::new();
        let doc = xhtml(
            r#"<a href="http://example.com">w</a><a href="mailto:me@example.com">m</a><a href="https://example.com/?a=1&amp;b=2">q</a>"#,
        );

        let fragment = rewrite("ch1.xhtml", &doc, &mut ids).unwrap();

        assert!(fragment.markup.contains(r#"href="http://example.com""#));
        assert!(fragment.markup.contains(r#"href="mailto:me@example.com""#));
        assert!(fragment.markup.contains(r#"href="https://example.com/?a=1&amp;b=2""#));
        assert_eq!(fragment.external_links, 3);
        assert_eq!(fragment.links_rewritten, 0);
    }

    #[test]
    fn test_whole_document_link() {
        let mut ids = IdentifierMap::new();
        let doc = xhtml(r#"<a href="ch2.xhtml">next</a>"#);
        let fragment = rewrite("ch1.xhtml", &doc, &mut ids).unwrap();
        assert!(fragment.markup.contains(r##"<a href="#s_ch2">next</a>"##));
    }

    #[test]
    fn test_only_anchor_hrefs_rewritten() {
        let mut ids = IdentifierMap::new();
        let doc = xhtml(r#"<link href="x.css"/><area href="ch2.xhtml"/>"#);
        let fragment = rewrite("ch1.xhtml", &doc, &mut ids).unwrap();
        assert!(fragment.markup.contains(r#"<link href="x.css"/>"#));
        assert!(fragment.markup.contains(r#"<area href="ch2.xhtml"/>"#));
    }

    #[test]
    fn test_prefixed_namespaces_carried_to_section() {
        let mut ids = IdentifierMap::new();
        let doc = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><body><aside epub:type="footnote" id="n1">n</aside></body></html>"#;

        let fragment = rewrite("notes.xhtml", doc, &mut ids).unwrap();

        assert!(fragment.markup.starts_with(
            r#"<section id="s_notes" xmlns:epub="http://www.idpf.org/2007/ops">"#
        ));
        assert!(fragment.markup.contains(r#"<aside epub:type="footnote" id="s_notes_s_n1">"#));
    }

    #[test]
    fn test_malformed_document() {
        let mut ids = IdentifierMap::new();
        let err = rewrite("bad.xhtml", "<html><body><p></body></html>", &mut ids).unwrap_err();
        assert!(matches!(err, MergeError::MalformedDocument { ref path, .. } if path == "bad.xhtml"));
    }

    #[test]
    fn test_missing_body() {
        let mut ids = IdentifierMap::new();
        let err = rewrite("nobody.xhtml", "<html><head/></html>", &mut ids).unwrap_err();
        assert!(matches!(err, MergeError::MalformedDocument { .. }));
    }
}
