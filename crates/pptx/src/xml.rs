//! Small XML helpers shared by the slide and chart readers and patchers.

use quick_xml::events::BytesStart;
use std::fmt::Display;
use xtab_core::Error;

/// Extract the local name from a potentially namespaced XML element name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Unescaped value of the attribute whose local name is `key`.
pub(crate) fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Element name with the local part swapped, keeping any prefix.
pub(crate) fn renamed(name: &[u8], local: &str) -> String {
    let name = String::from_utf8_lossy(name);
    match name.split_once(':') {
        Some((prefix, _)) => format!("{}:{}", prefix, local),
        None => local.to_string(),
    }
}

/// Whether the innermost elements of `stack` are `tail`, outermost first.
pub(crate) fn ends_with(stack: &[Vec<u8>], tail: &[&[u8]]) -> bool {
    stack.len() >= tail.len()
        && stack[stack.len() - tail.len()..]
            .iter()
            .zip(tail)
            .all(|(a, b)| a.as_slice() == *b)
}

/// Escape text content.
pub(crate) fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape an attribute value. Line breaks become character references so
/// multi-line alt text survives attribute normalization.
pub(crate) fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            '\t' => out.push_str("&#9;"),
            _ => out.push(c),
        }
    }
    out
}

pub(crate) fn xml_error(part: &str, e: impl Display) -> Error {
    Error::XmlError(format!("Error parsing '{}': {}", part, e))
}
