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
//! [nsq-tracing](crate) errors

use backtrace::Backtrace;

/// [nsq-tracing](crate) error type
///
/// [nsq-tracing](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of
/// a straightforward enumeration with a few match arms chosen on the basis what the caller will
/// need to repond.
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// A producer has already been attached to this logger
    AlreadyInitialized,
    /// The broker address is malformed, or could not be resolved
    BadBrokerAddress {
        addr: String,
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// The topic name is not one nsqd will accept
    BadTopic { name: String, back: Backtrace },
    /// nsqd answered a command with an error frame
    Broker { message: String, back: Backtrace },
    /// The producer has been closed
    Closed,
    /// No application name was configured
    NoApplicationName,
    /// Failed to find either an IP address or a hostname for this host
    NoHostname {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
    /// nsqd sent something we don't understand
    Protocol { message: String, back: Backtrace },
    /// An envelope could not be serialized to JSON
    Serialization {
        source: serde_json::Error,
        back: Backtrace,
    },
    /// General transport layer error
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
}

impl std::convert::From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::AlreadyInitialized => {
                write!(f, "A producer has already been attached to this logger")
            }
            Error::BadBrokerAddress { addr, source, .. } => {
                write!(f, "Bad NSQ address {}: {}", addr, source)
            }
            Error::BadTopic { name, .. } => write!(f, "{:?} is not a valid NSQ topic name", name),
            Error::Broker { message, .. } => write!(f, "nsqd replied with an error: {}", message),
            Error::Closed => write!(f, "The NSQ producer has been closed"),
            Error::NoApplicationName => write!(f, "No application name defined"),
            Error::NoHostname { source, .. } => {
                write!(f, "Couldn't find a valid hostname: {}", source)
            }
            Error::Protocol { message, .. } => write!(f, "NSQ protocol error: {}", message),
            Error::Serialization { source, .. } => {
                write!(f, "While serializing a log envelope, got {}", source)
            }
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            _ => write!(f, "Other nsq-tracing error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadBrokerAddress { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::BadTopic { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Broker { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::NoHostname { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Protocol { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Serialization { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:?}", self, back),
            err => write!(f, "nsq-tracing error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::BadBrokerAddress { source, .. } => Some(source.as_ref()),
            Error::NoHostname { source, .. } => Some(source.as_ref()),
            Error::Serialization { source, .. } => Some(source),
            Error::Transport { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
