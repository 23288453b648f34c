//! Vocabulary definitions for EPUB flattening
//!
//! Fixed literals shared by the package index, the identifier rewriter and
//! the merge assembler.

/// Prefix applied to every sanitized token
/// Guarantees the result starts with a letter and cannot collide with an
/// identifier that never went through sanitization
pub const SANITIZED_PREFIX: &str = "s_";

/// Character appended to a candidate identifier until it is unique
pub const DISAMBIGUATION_SUFFIX: char = 'E';

/// Joins the sanitized document path and the sanitized original identifier
pub const ID_SEPARATOR: &str = "_";

/// Manifest media type of the documents that take part in a merge
pub const XHTML_MEDIA_TYPE: &str = "application/xhtml+xml";

/// Hyperlink prefixes that are left untouched
pub const EXTERNAL_SCHEMES: [&str; 5] = ["http:", "https:", "ftp:", "ftps:", "mailto:"];

/// Local name of the element holding a document's visible content
pub const CONTENT_ROOT: &str = "body";

/// Element wrapped around each merged document
pub const SECTION_TAG: &str = "section";

/// Local name of the hyperlink element
pub const LINK_TAG: &str = "a";

/// Standard location of the OCF container descriptor
pub const CONTAINER_XML: &str = "META-INF/container.xml";

/// Extension of package documents, used when container.xml is missing
pub const OPF_EXTENSION: &str = ".opf";

/// Markup file extensions stripped by sanitization
pub const MARKUP_EXTENSIONS: [&str; 2] = [".xhtml", ".html"];
