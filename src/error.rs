// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

use std::io;

/// Errors that can occur while talking to the manager.
///
/// One merged taxonomy for the whole crate; status-derived variants carry
/// the command name (with any `_response` suffix already stripped), the
/// numeric status and the server's free-text message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or TLS establishment failure.
    #[error("cannot connect to manager: {0}")]
    Connection(String),
    /// The server rejected the credentials during the authenticate exchange.
    #[error("authentication failed for {username}: {status_text}")]
    Authentication {
        /// Username the manager rejected.
        username: String,
        /// The server's status text.
        status_text: String,
    },
    /// Socket I/O failure on an established session.
    #[error("socket error: {0:?}")]
    Transport(io::ErrorKind),
    /// The stream did not yield exactly one well-formed response document.
    #[error("cannot assemble response document: {0}")]
    Framing(String),
    /// The response carries no parseable `status` attribute.
    #[error("invalid result: response to {command} has unreadable status {status:?}")]
    Result {
        /// Tag of the offending response element.
        command: String,
        /// The unparsed value of the `status` attribute, if present.
        status: Option<String>,
    },
    /// 4xx, the element named in the request already exists.
    #[error("{command} failed [HTTP {status}]: {status_text}")]
    ElementExists {
        /// Command that failed.
        command: String,
        /// Status code.
        status: u32,
        /// The server's status text.
        status_text: String,
    },
    /// 4xx, the referenced element does not exist on the manager.
    #[error("{command} failed [HTTP {status}]: {status_text}")]
    ElementNotFound {
        /// Command that failed.
        command: String,
        /// Status code.
        status: u32,
        /// The server's status text.
        status_text: String,
    },
    /// 4xx, the manager rejected an argument of the request.
    #[error("{command} failed [HTTP {status}]: {status_text}")]
    InvalidArgument {
        /// Command that failed.
        command: String,
        /// Status code.
        status: u32,
        /// The server's status text.
        status_text: String,
    },
    /// Any other 4xx failure.
    #[error("{command} failed [HTTP {status}]: {status_text}")]
    Client {
        /// Command that failed.
        command: String,
        /// Status code.
        status: u32,
        /// The server's status text.
        status_text: String,
    },
    /// 5xx, a manager-side fault.
    #[error("{command} failed on the manager [HTTP {status}]: {status_text}")]
    Server {
        /// Command that failed.
        command: String,
        /// Status code.
        status: u32,
        /// The server's status text.
        status_text: String,
    },
    /// A status outside the 2xx/4xx/5xx classes.
    #[error("{command} returned unexpected status [HTTP {status}]: {status_text}")]
    Http {
        /// Command that failed.
        command: String,
        /// Status code.
        status: u32,
        /// The server's status text.
        status_text: String,
    },
    /// A value cannot be represented as an XML element.
    #[error("cannot encode request: {0}")]
    Encode(String),
    /// The response does not have the shape the command implies.
    #[error("unexpected response shape: {0}")]
    Decode(String),
    /// The session was closed; open a new one.
    #[error("session is closed")]
    SessionClosed,
}

impl Error {
    /// True for the 4xx family, recoverable by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::ElementExists { .. }
                | Error::ElementNotFound { .. }
                | Error::InvalidArgument { .. }
                | Error::Client { .. }
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Transport(err.kind())
    }
}
