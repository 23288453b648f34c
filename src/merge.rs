//! Merge assembly
//!
//! Drives the package index, boundary extractor and identifier rewriter over
//! the reading order and concatenates the result into one document.

use std::path::Path;

use serde::Serialize;

use crate::boundary::{self, WrapperPair};
use crate::error::MergeError;
use crate::id::{sanitize, IdentifierMap};
use crate::loader::Container;
use crate::package::{DocumentOrder, Package};
use crate::transform::{rewrite_section, IdentifierRename, RewrittenFragment};

/// Options for a merge
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Document whose head and tail wrap the output, by manifest href or
    /// archive path. Defaults to the first document in reading order.
    pub reference: Option<String>,
    /// Inserted between the head, each section and the tail
    pub separator: String,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            reference: None,
            separator: "\n".to_string(),
        }
    }
}

/// Statistics from a merge
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Number of source documents merged
    pub documents: usize,
    /// Number of element identifiers renamed
    pub identifiers_rewritten: usize,
    /// Number of identifiers that needed a disambiguating suffix
    pub identifiers_disambiguated: usize,
    /// Number of internal hyperlinks pointed at merged identifiers
    pub links_rewritten: usize,
    /// Number of hyperlinks left untouched for their external scheme
    pub external_links: usize,
}

/// One source document in the merged output
#[derive(Debug, Clone, Serialize)]
pub struct SectionRecord {
    pub path: String,
    pub section_id: String,
    pub identifiers: Vec<IdentifierRename>,
}

/// What a merge did, in reading order
#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    /// Document the wrapper was taken from
    pub reference_document: String,
    pub sections: Vec<SectionRecord>,
    pub stats: MergeStats,
}

/// Result of a merge
#[derive(Debug)]
pub struct MergeOutput {
    /// The merged document text
    pub document: String,
    pub report: MergeReport,
}

/// Merge every XHTML document of a package into one document
///
/// Nothing is produced unless every document reads, parses and rewrites
/// cleanly.
///
/// Generated identifiers are unique across the output. The reference
/// document's head and tail are copied verbatim, so an `id` on its `html`,
/// `head` or `body` element (or anything in its head) is kept as written
/// and is not checked against the generated ones.
pub fn merge(
    container: &Container,
    package: &Package,
    options: &MergeOptions,
) -> Result<MergeOutput, MergeError> {
    let order = package.document_order()?;
    if order.is_empty() {
        return Err(MergeError::EmptySpine);
    }

    let texts = order
        .iter()
        .map(|doc| container.read_text(&doc.path))
        .collect::<Result<Vec<_>, _>>()?;

    let reference = reference_index(&order, options.reference.as_deref());
    let reference_doc = &order.iter().as_slice()[reference];

    let mut ids = IdentifierMap::new();
    let section_ids = reserve_section_ids(&order, &mut ids);

    let WrapperPair { head, tail } = boundary::extract(&reference_doc.href, &texts[reference])?;

    let mut fragments: Vec<RewrittenFragment> = Vec::with_capacity(order.len());
    for ((doc, text), section_id) in order.iter().zip(&texts).zip(section_ids) {
        fragments.push(rewrite_section(&doc.href, text, section_id, &mut ids)?);
    }

    let separator = options.separator.as_str();
    let mut document = String::with_capacity(
        head.len() + tail.len() + fragments.iter().map(|f| f.markup.len() + separator.len()).sum::<usize>(),
    );
    document.push_str(&head);
    for fragment in &fragments {
        document.push_str(separator);
        document.push_str(&fragment.markup);
    }
    document.push_str(separator);
    document.push_str(&tail);

    let report = build_report(&reference_doc.href, fragments);

    tracing::info!(
        documents = report.stats.documents,
        identifiers = report.stats.identifiers_rewritten,
        disambiguated = report.stats.identifiers_disambiguated,
        links = report.stats.links_rewritten,
        reference = %report.reference_document,
        "merge complete"
    );

    Ok(MergeOutput { document, report })
}

/// Load a zipped or unpacked EPUB from disk and merge it
pub fn flatten(path: &Path, options: &MergeOptions) -> Result<MergeOutput, MergeError> {
    let container = Container::open(path)?;
    let package = Package::locate(&container)?;
    tracing::debug!(
        opf = %package.opf_path,
        manifest = package.manifest.len(),
        spine = package.spine.len(),
        "located package"
    );
    merge(&container, &package, options)
}

fn reference_index(order: &DocumentOrder, requested: Option<&str>) -> usize {
    let Some(name) = requested else {
        return 0;
    };
    match order.position(name) {
        Some(index) => index,
        None => {
            tracing::warn!(
                reference = %name,
                "reference document is not in the reading order, using the first document"
            );
            0
        }
    }
}

/// Claim every section identifier up front so element identifiers can
/// never take one that a later document needs
fn reserve_section_ids(order: &DocumentOrder, ids: &mut IdentifierMap) -> Vec<String> {
    order
        .iter()
        .map(|doc| {
            let (section_id, changed) = ids.claim(sanitize(&doc.href));
            if changed {
                tracing::warn!(
                    doc = %doc.href,
                    section = %section_id,
                    "document appears more than once in the spine"
                );
            }
            section_id
        })
        .collect()
}

fn build_report(reference: &str, fragments: Vec<RewrittenFragment>) -> MergeReport {
    let mut stats = MergeStats {
        documents: fragments.len(),
        ..MergeStats::default()
    };

    let sections = fragments
        .into_iter()
        .map(|fragment| {
            stats.identifiers_rewritten += fragment.identifiers.len();
            stats.identifiers_disambiguated += fragment.disambiguated;
            stats.links_rewritten += fragment.links_rewritten;
            stats.external_links += fragment.external_links;
            SectionRecord {
                path: fragment.doc_path,
                section_id: fragment.section_id,
                identifiers: fragment.identifiers,
            }
        })
        .collect();

    MergeReport {
        reference_document: reference.to_string(),
        sections,
        stats,
    }
}
