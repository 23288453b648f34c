//! EPUB Flattening Library
//!
//! This library merges the XHTML documents of an EPUB into a single
//! self-contained XHTML document, keeping reading order and every internal
//! cross-reference intact.
//!
//! # Overview
//!
//! Identifiers in an EPUB are only unique within the document that declares
//! them. Flattening makes them unique across the whole book by:
//!
//! 1. Deriving the reading order from the package's manifest and spine
//! 2. Taking the head and tail markup from one reference document
//! 3. Renaming every element identifier to `sanitize(doc) + "_" + sanitize(id)`,
//!    with an `E` suffix appended until the name is unused
//! 4. Rewriting internal hyperlinks to `#` fragments pointing at the new names
//! 5. Wrapping each document's content in a `<section>` named after the document
//!
//! # Naming
//!
//! - `s_` prefix: every generated identifier starts with it, so generated names
//!   never collide with names that were not generated
//! - `E` suffix: appended to a generated identifier that is already taken
//!
//! # Usage
//!
//! ## Flatten an EPUB on disk
//!
//! ```ignore
//! use epub_flatten::{flatten, MergeOptions};
//!
//! let output = flatten(Path::new("book.epub"), &MergeOptions::default())?;
//! println!("{}", output.document);
//! ```
//!
//! ## Merge from an in-memory container
//!
//! ```ignore
//! use epub_flatten::{merge, Container, MergeOptions, Package};
//!
//! let container = Container::from_zip_reader(Cursor::new(bytes))?;
//! let package = Package::locate(&container)?;
//! let output = merge(
//!     &container,
//!     &package,
//!     &MergeOptions {
//!         reference: Some("Text/cover.xhtml".to_string()),
//!         ..MergeOptions::default()
//!     },
//! )?;
//!
//! eprintln!("{} documents merged", output.report.stats.documents);
//! ```

pub mod boundary;
pub mod error;
pub mod id;
pub mod loader;
pub mod markup;
pub mod merge;
pub mod package;
pub mod transform;
pub mod vocab;

// Re-export main types for convenience
pub use crate::boundary::{extract, WrapperPair};
pub use crate::error::MergeError;
pub use crate::id::{qualified_id, rewrite_href, sanitize, IdentifierMap};
pub use crate::loader::{Container, DirectorySource, EntrySource, ZipSource};
pub use crate::merge::{
    flatten, merge, MergeOptions, MergeOutput, MergeReport, MergeStats, SectionRecord,
};
pub use crate::package::{DocumentOrder, Package, SpineDocument};
pub use crate::transform::{rewrite, IdentifierRename, RewrittenFragment};
pub use crate::vocab::{DISAMBIGUATION_SUFFIX, SANITIZED_PREFIX};
