//! Package index
//!
//! Locates the OPF package document inside a container, parses its manifest
//! and spine, and derives the reading order of the XHTML documents.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::MergeError;
use crate::loader::Container;
use crate::markup::{decode_attribute, local_name};
use crate::vocab::{CONTAINER_XML, OPF_EXTENSION, XHTML_MEDIA_TYPE};

/// One manifest entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    /// Path relative to the package document, as written in the OPF
    pub href: String,
    pub media_type: String,
}

/// Parsed package document
#[derive(Debug, Clone)]
pub struct Package {
    /// Archive path of the OPF file
    pub opf_path: String,
    /// Directory of the OPF file; manifest hrefs are relative to it
    pub base_dir: String,
    /// Maps manifest id -> item
    pub manifest: HashMap<String, ManifestItem>,
    /// Spine idrefs in declaration order
    pub spine: Vec<String>,
}

/// A document taking part in the merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineDocument {
    pub idref: String,
    /// Manifest href; identifiers are derived from this
    pub href: String,
    /// Archive path the href resolves to
    pub path: String,
}

/// Reading order of the XHTML documents, exactly as the spine declares it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentOrder(Vec<SpineDocument>);

impl DocumentOrder {
    /// Map every spine idref through the manifest
    ///
    /// An idref missing from the manifest, or naming an item that is not
    /// XHTML, is an error.
    pub fn build(package: &Package) -> Result<Self, MergeError> {
        let mut documents = Vec::with_capacity(package.spine.len());

        for idref in &package.spine {
            let item = package
                .manifest
                .get(idref)
                .ok_or_else(|| MergeError::UnknownSpineItem(idref.clone()))?;

            if item.media_type != XHTML_MEDIA_TYPE {
                return Err(MergeError::NonMarkupSpineItem {
                    idref: idref.clone(),
                    media_type: item.media_type.clone(),
                });
            }

            documents.push(SpineDocument {
                idref: idref.clone(),
                href: item.href.clone(),
                path: resolve_path(&package.base_dir, &item.href),
            });
        }

        Ok(Self(documents))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SpineDocument> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of a document given by manifest href or archive path
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|d| d.href == name || d.path == name)
    }
}

impl<'a> IntoIterator for &'a DocumentOrder {
    type Item = &'a SpineDocument;
    type IntoIter = std::slice::Iter<'a, SpineDocument>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Package {
    /// Find and parse the package document of a container
    pub fn locate(container: &Container) -> Result<Self, MergeError> {
        let opf_path = find_opf_path(container)?;
        let bytes = container
            .get(&opf_path)
            .ok_or_else(|| MergeError::Metadata(format!("package document {} not found", opf_path)))?;
        let content = std::str::from_utf8(strip_bom(bytes))
            .map_err(|e| MergeError::Metadata(format!("{}: {}", opf_path, e)))?;

        Self::parse(&opf_path, content)
    }

    /// Parse OPF text. `opf_path` anchors relative manifest hrefs.
    pub fn parse(opf_path: &str, content: &str) -> Result<Self, MergeError> {
        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut manifest = HashMap::new();
        let mut spine = Vec::new();
        let mut saw_manifest = false;
        let mut saw_spine = false;

        let metadata_error = |reason: String| MergeError::Metadata(format!("{}: {}", opf_path, reason));

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    let name = e.name();
                    match local_name_bytes(name.as_ref()) {
                        "manifest" => saw_manifest = true,
                        "spine" => saw_spine = true,
                        "item" => {
                            let id = attribute(&e, "id").map_err(metadata_error)?;
                            let href = attribute(&e, "href").map_err(metadata_error)?;
                            let media_type = attribute(&e, "media-type").map_err(metadata_error)?;
                            if let (Some(id), Some(href)) = (id, href) {
                                manifest.insert(
                                    id,
                                    ManifestItem {
                                        href,
                                        media_type: media_type.unwrap_or_default(),
                                    },
                                );
                            }
                        }
                        "itemref" => {
                            if let Some(idref) = attribute(&e, "idref").map_err(metadata_error)? {
                                spine.push(idref);
                            }
                        }
                        _ => {}
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(metadata_error(e.to_string())),
                Ok(_) => {}
            }
        }

        if !saw_manifest {
            return Err(metadata_error("no <manifest> element".to_string()));
        }
        if !saw_spine {
            return Err(metadata_error("no <spine> element".to_string()));
        }

        Ok(Self {
            opf_path: opf_path.to_string(),
            base_dir: parent_dir(opf_path).to_string(),
            manifest,
            spine,
        })
    }

    pub fn document_order(&self) -> Result<DocumentOrder, MergeError> {
        DocumentOrder::build(self)
    }
}

/// OPF path from META-INF/container.xml, else the first `.opf` entry
fn find_opf_path(container: &Container) -> Result<String, MergeError> {
    if let Some(bytes) = container.get(CONTAINER_XML) {
        let content = std::str::from_utf8(strip_bom(bytes))
            .map_err(|e| MergeError::Metadata(format!("{}: {}", CONTAINER_XML, e)))?;
        if let Some(path) = parse_container_xml(content)? {
            return Ok(path);
        }
    }

    container
        .paths()
        .find(|p| p.ends_with(OPF_EXTENSION))
        .map(str::to_string)
        .ok_or_else(|| MergeError::Metadata("no package document (.opf) in container".to_string()))
}

/// `full-path` of the first `rootfile` in container.xml
fn parse_container_xml(content: &str) -> Result<Option<String>, MergeError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e))
                if local_name_bytes(e.name().as_ref()) == "rootfile" =>
            {
                return attribute(&e, "full-path")
                    .map_err(|e| MergeError::Metadata(format!("{}: {}", CONTAINER_XML, e)));
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(MergeError::Metadata(format!("{}: {}", CONTAINER_XML, e))),
            Ok(_) => {}
        }
    }
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_ref() == name.as_bytes() {
            return decode_attribute(&attr.value).map(Some);
        }
    }
    Ok(None)
}

fn local_name_bytes(name: &[u8]) -> &str {
    std::str::from_utf8(name).map(local_name).unwrap_or_default()
}

fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(dir, _)| dir)
}

pub(crate) fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data)
}

/// Join an href onto a base directory, folding `.` and `..` segments
pub fn resolve_path(base: &str, href: &str) -> String {
    let mut segments: Vec<&str> = base.split('/').filter(|s| !s.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}
