// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Owned XML element trees plus incremental document assembly.
//!
//! Everything that touches quick-xml lives here; the rest of the crate
//! only works with [`Element`], so the backing XML library can be swapped
//! in one place.

use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::Error;

type Writer = quick_xml::Writer<Cursor<Vec<u8>>>;

/// An owned XML element: name, attributes, children and direct text.
///
/// Attributes keep insertion order since the wire bytes of a request must
/// be reproducible. Direct text is the concatenation of all character data
/// at this element's level.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Element>,
    text: Option<String>,
}

impl Element {
    /// Creates an element without attributes, children or text.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
            text: None,
        }
    }

    /// The tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets an attribute, replacing a previous value under the same name.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attrs.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name, value)),
        }
    }

    /// Returns an attribute value.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates over the attributes in insertion order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Appends a child element.
    pub fn push(&mut self, child: Element) {
        self.children.push(child);
    }

    /// The child elements in document order.
    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Returns the first child with the given tag name.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Iterates over all children with the given tag name.
    pub fn find_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// The element's direct text, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Replaces the element's direct text.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    fn append_text(&mut self, more: &str) {
        match &mut self.text {
            Some(text) => text.push_str(more),
            None => self.text = Some(more.to_string()),
        }
    }

    /// Serializes the element to UTF-8 XML bytes.
    ///
    /// Empty elements are written as a start/end pair, matching the wire
    /// bytes the managers have always seen.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        self.write_into(&mut writer)?;
        Ok(writer.into_inner().into_inner())
    }

    fn write_into(&self, writer: &mut Writer) -> Result<(), Error> {
        let mut start = BytesStart::new(self.name.as_str());
        for (k, v) in &self.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        writer
            .write_event(Event::Start(start))
            .map_err(|e| Error::Encode(e.to_string()))?;
        if let Some(text) = &self.text {
            writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(|e| Error::Encode(e.to_string()))?;
        }
        for child in &self.children {
            child.write_into(writer)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| Error::Encode(e.to_string()))?;
        Ok(())
    }

    /// Parses exactly one document from the given bytes.
    ///
    /// Fails with [`Error::Framing`] on malformed input, trailing top-level
    /// elements or a document cut off mid-element.
    pub fn parse(bytes: &[u8]) -> Result<Element, Error> {
        let mut reader = quick_xml::Reader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(start)) => {
                    stack.push(element_from_start(&start)?);
                }
                Ok(Event::Empty(start)) => {
                    let elem = element_from_start(&start)?;
                    attach(elem, &mut stack, &mut root)?;
                }
                Ok(Event::End(_)) => {
                    let elem = stack
                        .pop()
                        .ok_or_else(|| Error::Framing("unbalanced end tag".to_string()))?;
                    attach(elem, &mut stack, &mut root)?;
                }
                Ok(Event::Text(text)) => {
                    if let Some(top) = stack.last_mut() {
                        let text = text
                            .unescape()
                            .map_err(|e| Error::Framing(e.to_string()))?;
                        top.append_text(&text);
                    }
                }
                Ok(Event::CData(data)) => {
                    if let Some(top) = stack.last_mut() {
                        top.append_text(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Ok(Event::Eof) => break,
                // declaration, comments, processing instructions
                Ok(_) => {}
                Err(e) => return Err(Error::Framing(e.to_string())),
            }
            buf.clear();
        }
        if !stack.is_empty() {
            return Err(Error::Framing(
                "stream ended inside an open element".to_string(),
            ));
        }
        root.ok_or_else(|| Error::Framing("stream contains no element".to_string()))
    }
}

fn element_from_start(start: &BytesStart) -> Result<Element, Error> {
    let mut elem = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::Framing(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Framing(e.to_string()))?;
        elem.set_attr(key, value.into_owned());
    }
    Ok(elem)
}

fn attach(
    elem: Element,
    stack: &mut Vec<Element>,
    root: &mut Option<Element>,
) -> Result<(), Error> {
    match stack.last_mut() {
        Some(parent) => parent.push(elem),
        None if root.is_none() => *root = Some(elem),
        None => {
            return Err(Error::Framing(
                "more than one top-level element".to_string(),
            ))
        }
    }
    Ok(())
}

/// Reassembles one response document from streamed socket chunks.
///
/// The protocol has no length prefix, so completeness is detected by
/// parsing incrementally: the document is done as soon as the accumulated
/// bytes contain one balanced top-level element.
#[derive(Debug, Default)]
pub struct DocumentAssembler {
    buf: Vec<u8>,
    complete: bool,
}

impl DocumentAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk of bytes from the stream.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
        if !self.complete {
            self.complete = balanced(&self.buf);
        }
    }

    /// True once the buffered bytes contain a balanced top-level element.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Parses the accumulated document.
    ///
    /// Fails with [`Error::Framing`] when the stream closed mid-document
    /// or the bytes are not well-formed XML.
    pub fn finish(self) -> Result<Element, Error> {
        if self.buf.is_empty() {
            return Err(Error::Framing(
                "connection closed before any response bytes".to_string(),
            ));
        }
        Element::parse(&self.buf)
    }
}

/// Whether `buf` contains at least one complete top-level element.
fn balanced(buf: &[u8]) -> bool {
    let mut reader = quick_xml::Reader::from_reader(buf);
    let mut scratch = Vec::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event_into(&mut scratch) {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => match depth {
                0 => return false,
                1 => return true,
                _ => depth -= 1,
            },
            Ok(Event::Empty(_)) if depth == 0 => return true,
            Ok(Event::Eof) => return false,
            Ok(_) => {}
            // likely a tag truncated at a chunk boundary
            Err(_) => return false,
        }
        scratch.clear();
    }
}
