// SPDX-FileCopyrightText: 2025 Greenbone AG
//
// SPDX-License-Identifier: GPL-2.0-or-later WITH x11vnc-openssl-exception

#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
mod client;
mod codec;
mod connection;
mod error;
mod response;
mod xml;

pub use client::{
    Client, Config, GetConfigOpts, NvtEntry, ReportContent, ScheduleSpec, TargetSpec, TaskSpec,
    TlsClient, DEFAULT_PORT, DEFAULT_SCANNER_NAME,
};
pub use codec::{decode, decode_body, BoolFormat, Codec, Value, ATTR_PREFIX, TEXT_KEY};
pub use connection::{Connection, TlsConnection, TlsMode, BLOCK_SIZE};
pub use error::Error;
pub use response::{ClientKind, Response, StatusClass};
pub use xml::{DocumentAssembler, Element};
