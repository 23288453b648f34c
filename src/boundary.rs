//! Header/footer extraction
//!
//! Splits one document into the markup before its content and the markup
//! after it. The merged output reuses exactly one such pair.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::MergeError;
use crate::markup::local_name;
use crate::vocab::CONTENT_ROOT;

/// Markup surrounding a document's content root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperPair {
    /// Start of the document through the content root's opening tag
    pub head: String,
    /// The content root's closing tag through the end of the document
    pub tail: String,
}

/// Extract the wrapper from raw document text
///
/// The head ends at the *first* opening `body` tag and the tail starts at the
/// *last* closing `body` tag, so nested elements sharing the name never
/// truncate the wrapper. The whole document is tokenized, so ill-formed
/// markup is rejected.
pub fn extract(doc_path: &str, text: &str) -> Result<WrapperPair, MergeError> {
    let mut reader = Reader::from_str(text);
    let mut head_end: Option<usize> = None;
    let mut tail_start: Option<usize> = None;

    loop {
        let before = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(e)) if is_content_root(e.name().as_ref()) => {
                if head_end.is_none() {
                    head_end = Some(reader.buffer_position() as usize);
                }
            }
            Ok(Event::Empty(e)) if is_content_root(e.name().as_ref()) => {
                if head_end.is_none() {
                    return Err(MergeError::malformed(
                        doc_path,
                        format!("<{}/> has no content", CONTENT_ROOT),
                    ));
                }
            }
            Ok(Event::End(e)) if is_content_root(e.name().as_ref()) => {
                tail_start = Some(before);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(MergeError::malformed(
                    doc_path,
                    format!("{} (byte {})", e, reader.error_position()),
                ))
            }
            Ok(_) => {}
        }
    }

    match (head_end, tail_start) {
        (Some(head_end), Some(tail_start)) if head_end <= tail_start => {
            tracing::debug!(
                doc = %doc_path,
                head_bytes = head_end,
                tail_bytes = text.len() - tail_start,
                "extracted wrapper"
            );
            Ok(WrapperPair {
                head: text[..head_end].to_string(),
                tail: text[tail_start..].to_string(),
            })
        }
        _ => Err(MergeError::malformed(
            doc_path,
            format!("no <{}> element", CONTENT_ROOT),
        )),
    }
}

fn is_content_root(name: &[u8]) -> bool {
    std::str::from_utf8(name).is_ok_and(|n| local_name(n) == CONTENT_ROOT)
}
