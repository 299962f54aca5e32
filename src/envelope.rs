// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of nsq-tracing.
//
// nsq-tracing is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// nsq-tracing is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with nsq-tracing.  If
// not, see <http://www.gnu.org/licenses/>.

//! Log envelopes
//! =============
//!
//! # Introduction
//!
//! The translation from a log call to an NSQ message occurs in three parts:
//!
//! 1. resolving the call's template & arguments to a textual message
//!
//! 2. wrapping that message, together with the process' [`IdentityTags`], a unique id, a timestamp
//!    & a [`Severity`] into an [`Envelope`]
//!
//! 3. serializing the envelope as `{"data": {...}}` & handing the bytes to a [`Transport`]
//!
//! This module implements steps 1 & 2, and the serialization half of step 3.
//!
//! [`Transport`]: crate::transport::Transport
//!
//! # Templates
//!
//! Templates are formatted at runtime: `{}` is replaced with the next argument, `{N}` with
//! argument N (counting from zero) and `{{` & `}}` stand for literal braces. A template that can't
//! be formatted against its arguments is published verbatim.

use crate::{
    error::{Error, Result},
    identity::IdentityTags,
    severity::Severity,
    LOCAL_TARGET,
};

use backtrace::Backtrace;
use chrono::prelude::*;
use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

type StdResult<T, E> = std::result::Result<T, E>;

/// The arguments accompanying a log template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arguments {
    /// The template is the message; no interpolation is attempted
    Verbatim,
    /// Positional arguments, already rendered to text
    Positional(Vec<String>),
}

impl Arguments {
    /// Render `args` now, so that the call owns its data from here on.
    pub fn from_display(args: &[&dyn std::fmt::Display]) -> Arguments {
        Arguments::Positional(args.iter().map(|arg| arg.to_string()).collect())
    }
}

/// Reasons a template couldn't be formatted.
#[derive(Debug, PartialEq, Eq)]
enum FormatError {
    BadPlaceholder(String),
    MissingArgument(usize),
    UnclosedPlaceholder,
    UnmatchedBrace,
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        match self {
            FormatError::BadPlaceholder(spec) => write!(f, "bad placeholder {{{}}}", spec),
            FormatError::MissingArgument(idx) => write!(f, "no argument #{}", idx),
            FormatError::UnclosedPlaceholder => write!(f, "unclosed '{{'"),
            FormatError::UnmatchedBrace => write!(f, "unmatched '}}'"),
        }
    }
}

fn interpolate(template: &str, args: &[String]) -> StdResult<String, FormatError> {
    let mut out = String::with_capacity(template.len());
    let mut next = 0;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut spec = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => spec.push(c),
                        None => return Err(FormatError::UnclosedPlaceholder),
                    }
                }
                let idx = if spec.is_empty() {
                    next += 1;
                    next - 1
                } else {
                    spec.trim()
                        .parse::<usize>()
                        .map_err(|_| FormatError::BadPlaceholder(spec.clone()))?
                };
                out.push_str(args.get(idx).ok_or(FormatError::MissingArgument(idx))?);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(FormatError::UnmatchedBrace),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Resolve a log call's template & arguments to the message text.
///
/// With no arguments (or [`Arguments::Verbatim`]) the template is the message. Otherwise the
/// template is interpolated; if that fails the template is used as-is.
pub fn resolve_message(template: &str, args: &Arguments) -> String {
    match args {
        Arguments::Verbatim => template.to_string(),
        Arguments::Positional(v) if v.is_empty() => template.to_string(),
        Arguments::Positional(v) => interpolate(template, v).unwrap_or_else(|err| {
            tracing::warn!(
                target: LOCAL_TARGET,
                "Couldn't format {:?} ({}); publishing it verbatim",
                template,
                err
            );
            template.to_string()
        }),
    }
}

/// One log message, as published.
///
/// Field names match the wire format; the identity tags are flattened in alongside them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    tags: BTreeMap<String, String>,
    uuid: String,
    msg: String,
    timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    severity: Option<Severity>,
}

/// The wire layout: the envelope lives under "data".
#[derive(Serialize)]
struct Payload<'a> {
    data: &'a Envelope,
}

#[derive(Deserialize)]
struct OwnedPayload {
    data: Envelope,
}

/// Wrap `message` in a fresh [`Envelope`]; the caller attaches the severity with
/// [`Envelope::with_severity`].
pub fn build_envelope(tags: &IdentityTags, message: String) -> Envelope {
    Envelope {
        tags: tags.to_map(),
        uuid: uuid::Uuid::new_v4().to_string(),
        msg: message,
        timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        severity: None,
    }
}

impl Envelope {
    pub fn with_severity(mut self, severity: Severity) -> Envelope {
        self.severity = Some(severity);
        self
    }
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
    pub fn msg(&self) -> &str {
        &self.msg
    }
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
    pub fn severity(&self) -> Option<Severity> {
        self.severity
    }
    /// Serialize to the bytes published to NSQ.
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&Payload { data: self }).map_err(|err| Error::Serialization {
            source: err,
            back: Backtrace::new(),
        })
    }
    /// Parse a published message back into an [`Envelope`].
    pub fn from_payload(buf: &[u8]) -> Result<Envelope> {
        serde_json::from_slice::<OwnedPayload>(buf)
            .map(|p| p.data)
            .map_err(|err| Error::Serialization {
                source: err,
                back: Backtrace::new(),
            })
    }
}
