//! Bruker `.spx` spectrum documents.

use crate::normalize::{node_key, normalize, NormalizeConfig};
use crate::{Error, Result};
use encoding_rs::{Encoding, UTF_8};
use roxmltree::{Document, Node, ParsingOptions};
use std::borrow::Cow;
use std::path::Path;
use wafermap_core::{NormalizedTree, TreeNode};

/// Parsed spectrum export: the normalized metadata tree and raw channel counts.
#[derive(Debug, Clone, PartialEq)]
pub struct SpxDocument {
    /// Normalized tree with a single entry for the spectrum node.
    pub tree: NormalizedTree,
    /// Counts per detector channel.
    pub channels: Vec<i64>,
}

impl SpxDocument {
    /// Parses an `.spx` document.
    ///
    /// The spectrum is the second element child of the document root; the
    /// first holds the export header.
    ///
    /// # Errors
    /// Returns an error for malformed XML, a missing spectrum node, or
    /// non-integer channel counts.
    pub fn parse(text: &str, config: &NormalizeConfig) -> Result<Self> {
        let options = ParsingOptions {
            allow_dtd: true,
            ..ParsingOptions::default()
        };
        let doc = Document::parse_with_options(text, options)?;
        let spectrum = doc
            .root_element()
            .children()
            .filter(Node::is_element)
            .nth(1)
            .ok_or_else(|| Error::InvalidDocument("no spectrum node under document root".into()))?;

        let mut tree = NormalizedTree::new();
        tree.insert(
            node_key(spectrum)?,
            TreeNode::Branch(normalize(spectrum, config)?),
        );
        let channels = read_channels(spectrum)?;

        Ok(Self { tree, channels })
    }

    /// Reads and parses an `.spx` file.
    ///
    /// # Errors
    /// See [`SpxDocument::parse`]; I/O errors are propagated.
    pub fn read<P: AsRef<Path>>(path: P, config: &NormalizeConfig) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let (text, encoding, had_errors) = decode(&bytes);
        if had_errors {
            log::warn!(
                "{}: bytes invalid in {} were replaced",
                path.display(),
                encoding.name()
            );
        }
        Self::parse(&text, config)
    }
}

/// Decodes a document with the encoding named in its XML declaration,
/// UTF-8 when there is none. A byte order mark takes precedence.
fn decode(bytes: &[u8]) -> (Cow<'_, str>, &'static Encoding, bool) {
    let encoding = declared_encoding(bytes)
        .and_then(Encoding::for_label)
        .unwrap_or(UTF_8);
    encoding.decode(bytes)
}

/// Label of the `encoding` pseudo-attribute of the XML declaration.
fn declared_encoding(bytes: &[u8]) -> Option<&[u8]> {
    let head = &bytes[..bytes.len().min(256)];
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    if !head.starts_with(b"<?xml") {
        return None;
    }
    let end = head.windows(2).position(|w| w == b"?>")?;
    let declaration = &head[..end];
    let start = declaration
        .windows(b"encoding".len())
        .position(|w| w == b"encoding")?
        + b"encoding".len();

    let rest = declaration[start..].trim_ascii_start();
    let rest = rest.strip_prefix(b"=")?.trim_ascii_start();
    let (&quote, rest) = rest.split_first()?;
    if quote != b'"' && quote != b'\'' {
        return None;
    }
    let len = rest.iter().position(|&b| b == quote)?;
    Some(&rest[..len])
}

/// Channel counts from the last `Channels` element, comma separated.
fn read_channels(spectrum: Node<'_, '_>) -> Result<Vec<i64>> {
    let Some(text) = spectrum
        .descendants()
        .filter(|n| n.has_tag_name("Channels"))
        .last()
        .and_then(|n| n.text())
    else {
        return Ok(Vec::new());
    };

    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::InvalidDocument(format!("invalid channel count {s:?}")))
        })
        .collect()
}
