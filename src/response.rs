// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

//! Validated, mapping-like wrappers around raw response elements.

use std::cell::OnceCell;
use std::ops::Index;

use crate::codec::{self, Value};
use crate::error::Error;
use crate::xml::Element;

/// Outcome of classifying a response's status code, decided exactly once
/// at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx.
    Success,
    /// 4xx; the request can be fixed by the caller.
    Client(ClientKind),
    /// 5xx; a manager-side fault.
    Server,
    /// Any other leading digit.
    Other,
}

/// Best-effort sub-classification of a 4xx from the server's free-text
/// message. Unmatched text stays [`ClientKind::Generic`]; classification
/// itself never fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    /// The element named in the request already exists.
    Exists,
    /// The referenced element does not exist.
    NotFound,
    /// The manager rejected an argument.
    InvalidArgument,
    /// Any other client-side failure.
    Generic,
}

fn classify(status: u32, status_text: &str) -> StatusClass {
    match status / 100 {
        2 => StatusClass::Success,
        4 => {
            let text = status_text.to_ascii_lowercase();
            let kind = if text.contains("already exists") || text.contains("exists") {
                ClientKind::Exists
            } else if text.contains("failed to find") || text.contains("not found") {
                ClientKind::NotFound
            } else if text.contains("invalid argument") || text.contains("bogus") {
                ClientKind::InvalidArgument
            } else {
                ClientKind::Generic
            };
            StatusClass::Client(kind)
        }
        5 => StatusClass::Server,
        _ => StatusClass::Other,
    }
}

fn strip_response_suffix(tag: &str) -> &str {
    tag.strip_suffix("_response").unwrap_or(tag)
}

/// A validated response to one command.
///
/// Owns the originating request element (for error context), the raw
/// response element, and a lazily decoded structural view of the body.
/// The decoded view may be freely mutated by the caller; the raw XML is
/// never touched by that.
#[derive(Debug)]
pub struct Response {
    request: Element,
    xml: Element,
    command: String,
    status: u32,
    status_text: String,
    class: StatusClass,
    data: OnceCell<Value>,
}

impl Response {
    /// Wraps and classifies a raw response element.
    ///
    /// A well-formed response with an error status constructs fine (use
    /// [`Response::check_status`] to surface it); only a missing or
    /// unparseable `status` attribute fails here, with [`Error::Result`].
    pub fn new(request: Element, xml: Element) -> Result<Self, Error> {
        let status_text = xml.attr("status_text").unwrap_or_default().to_string();
        let status = match xml.attr("status").map(|s| (s, s.parse::<u32>())) {
            Some((_, Ok(status))) => status,
            raw => {
                return Err(Error::Result {
                    command: strip_response_suffix(xml.name()).to_string(),
                    status: raw.map(|(s, _)| s.to_string()),
                });
            }
        };
        let class = classify(status, &status_text);
        tracing::debug!(command = request.name(), status, ?class, "response classified");
        Ok(Self {
            command: strip_response_suffix(request.name()).to_string(),
            request,
            xml,
            status,
            status_text,
            class,
            data: OnceCell::new(),
        })
    }

    /// True iff the status is in the success class.
    pub fn ok(&self) -> bool {
        self.class == StatusClass::Success
    }

    /// The classification decided at construction.
    pub fn status_class(&self) -> StatusClass {
        self.class
    }

    /// The numeric status code. The protocol uses three digits; any
    /// numeric value outside the 2xx/4xx/5xx buckets classifies as
    /// [`StatusClass::Other`].
    pub fn status_code(&self) -> u32 {
        self.status
    }

    /// The server's free-text status message.
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// The command this response answers (request tag, `_response`
    /// suffix stripped).
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The originating request element.
    pub fn request(&self) -> &Element {
        &self.request
    }

    /// The raw response element.
    pub fn xml(&self) -> &Element {
        &self.xml
    }

    /// Returns the classified error for a non-success status, `Ok(())`
    /// otherwise. Calling this is the caller's explicit choice.
    pub fn check_status(&self) -> Result<(), Error> {
        let command = self.command.clone();
        let status = self.status;
        let status_text = self.status_text.clone();
        match self.class {
            StatusClass::Success => Ok(()),
            StatusClass::Client(ClientKind::Exists) => Err(Error::ElementExists {
                command,
                status,
                status_text,
            }),
            StatusClass::Client(ClientKind::NotFound) => Err(Error::ElementNotFound {
                command,
                status,
                status_text,
            }),
            StatusClass::Client(ClientKind::InvalidArgument) => Err(Error::InvalidArgument {
                command,
                status,
                status_text,
            }),
            StatusClass::Client(ClientKind::Generic) => Err(Error::Client {
                command,
                status,
                status_text,
            }),
            StatusClass::Server => Err(Error::Server {
                command,
                status,
                status_text,
            }),
            StatusClass::Other => Err(Error::Http {
                command,
                status,
                status_text,
            }),
        }
    }

    fn decode_data(&self) -> Value {
        // drop the tag key so callers index the response's own fields
        match codec::decode(&self.xml) {
            Value::Map(entries) => entries
                .into_iter()
                .next()
                .map(|(_, body)| body)
                .unwrap_or(Value::Null),
            other => other,
        }
    }

    /// The decoded body, decoded on first access and cached.
    pub fn data(&self) -> &Value {
        self.data.get_or_init(|| self.decode_data())
    }

    /// Mutable access to the decoded body.
    pub fn data_mut(&mut self) -> &mut Value {
        if self.data.get().is_none() {
            let decoded = self.decode_data();
            let _ = self.data.set(decoded);
        }
        match self.data.get_mut() {
            Some(value) => value,
            None => unreachable!("cell was initialized above"),
        }
    }

    fn entries(&self) -> &[(String, Value)] {
        self.data().as_map().unwrap_or(&[])
    }

    fn entries_mut(&mut self) -> Option<&mut Vec<(String, Value)>> {
        let data = self.data_mut();
        if data.is_null() {
            *data = Value::Map(Vec::new());
        }
        match data {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a key in the decoded body.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data().get(key)
    }

    /// Looks up a key, falling back to `default`.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.get(key).unwrap_or(default)
    }

    /// True when the decoded body has an entry for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Iterates over the decoded body's entries. Empty when the body
    /// decoded to something other than a mapping.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries().iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Inserts or replaces an entry in the decoded body. Only affects the
    /// decoded view, never the raw XML. No effect when the body is a
    /// scalar or list.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if let Some(entries) = self.entries_mut() {
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => *existing = value,
                None => entries.push((key, value)),
            }
        }
    }

    /// Merges entries into the decoded body, replacing existing keys.
    pub fn update(&mut self, entries: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in entries {
            self.insert(key, value);
        }
    }

    /// Removes an entry from the decoded body and returns its value.
    pub fn pop(&mut self, key: &str) -> Option<Value> {
        let entries = self.entries_mut()?;
        let index = entries.iter().position(|(k, _)| k == key)?;
        Some(entries.remove(index).1)
    }

    /// Removes an entry from the decoded body.
    pub fn remove(&mut self, key: &str) {
        self.pop(key);
    }
}

impl Index<&str> for Response {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        match self.get(key) {
            Some(value) => value,
            None => panic!("response to {} has no entry {key:?}", self.command),
        }
    }
}
