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

//! The NSQ transport layer.
//!
//! This module defines the [`Transport`] trait that all producers must support, as well as an
//! implementation speaking the [NSQ TCP protocol] to a single nsqd.
//!
//! [NSQ TCP protocol]: https://nsq.io/clients/tcp_protocol_spec.html
//!
//! # Examples
//!
//! To publish to an nsqd listening on port 4150 (the default) on localhost:
//!
//! ```rust
//! use nsq_tracing::transport::NsqTransport;
//! let transpo = NsqTransport::local("my-app nsq-tracing", "my-host").unwrap();
//! ```
//!
//! Nothing is sent (or even resolved) until the first publish, but an address that isn't a
//! `host:port` pair fails right away:
//!
//! ```rust
//! use nsq_tracing::transport::NsqTransport;
//! let transpo = NsqTransport::new("nsqd-without-a-port", "my-app", "my-host");
//! assert!(transpo.is_err()); // not a host:port, after all
//! ```

use crate::error::{Error, Result};

use backtrace::Backtrace;
use bytes::{Buf, BufMut};
use serde::Serialize;

use std::{
    io::{Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
};

/// The topic every envelope is published to.
pub const TOPIC: &str = "log.raw#ephemeral";

/// Where nsqd listens for TCP clients unless told otherwise.
pub const DEFAULT_NSQD_ADDRESS: &str = "127.0.0.1:4150";

const MAGIC_V2: &[u8] = b"  V2";

const FRAME_TYPE_RESPONSE: u32 = 0;
const FRAME_TYPE_ERROR: u32 = 1;
const FRAME_TYPE_MESSAGE: u32 = 2;

const HEARTBEAT: &[u8] = b"_heartbeat_";

// nsqd's own default for --max-msg-size is 1MiB; leave room for any sane response.
const MAX_FRAME_SIZE: u32 = 4 * 1024 * 1024;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         wire encoding                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Check `name` against nsqd's rules for topic names: one to sixty-four characters drawn from
/// `[.a-zA-Z0-9_-]`, optionally suffixed with `#ephemeral`.
pub fn validate_topic(name: &str) -> Result<()> {
    let base = name.strip_suffix("#ephemeral").unwrap_or(name);
    if !name.is_empty()
        && name.len() <= 64
        && !base.is_empty()
        && base
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
    {
        Ok(())
    } else {
        Err(Error::BadTopic {
            name: name.to_string(),
            back: Backtrace::new(),
        })
    }
}

/// Encode a command that carries a body: `<line>\n`, the body's size as a big-endian `u32`, then
/// the body itself.
fn command_with_body(line: &str, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(line.len() + 5 + body.len());
    buf.put_slice(line.as_bytes());
    buf.put_u8(b'\n');
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    buf
}

/// Encode `PUB <topic>` with `body` as the message.
pub fn pub_command(topic: &str, body: &[u8]) -> Vec<u8> {
    command_with_body(&format!("PUB {}", topic), body)
}

/// Read one frame: `[u32 size][u32 frame type][size - 4 bytes of data]`.
fn read_frame<R: Read>(reader: &mut R) -> Result<(u32, Vec<u8>)> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let mut header = &header[..];
    let size = header.get_u32();
    let frame_type = header.get_u32();
    if !(4..=MAX_FRAME_SIZE).contains(&size) {
        return Err(Error::Protocol {
            message: format!("bad frame size {}", size),
            back: Backtrace::new(),
        });
    }
    let mut data = vec![0u8; (size - 4) as usize];
    reader.read_exact(&mut data)?;
    Ok((frame_type, data))
}

/// Wait for nsqd's answer to the last command, answering any heartbeats along the way.
fn read_response<S: Read + Write>(stream: &mut S) -> Result<()> {
    loop {
        let (frame_type, data) = read_frame(stream)?;
        match frame_type {
            FRAME_TYPE_RESPONSE if data == HEARTBEAT => {
                stream.write_all(b"NOP\n")?;
            }
            FRAME_TYPE_RESPONSE => return Ok(()),
            FRAME_TYPE_ERROR => {
                return Err(Error::Broker {
                    message: String::from_utf8_lossy(&data).into_owned(),
                    back: Backtrace::new(),
                })
            }
            FRAME_TYPE_MESSAGE => {
                return Err(Error::Protocol {
                    message: "received a message frame on a producer connection".to_string(),
                    back: Backtrace::new(),
                })
            }
            other => {
                return Err(Error::Protocol {
                    message: format!("unknown frame type {}", other),
                    back: Backtrace::new(),
                })
            }
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      transport mechanisms                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all producers must support.
pub trait Transport: Send {
    /// Publish `payload` to `topic`.
    ///
    /// Callers may log a failure, but nothing more: the payload is not retried.
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()>;
    /// Release the producer. Publishing after this fails with [`Error::Closed`].
    fn close(&mut self) -> Result<()>;
}

#[derive(Serialize)]
struct Identify<'a> {
    client_id: &'a str,
    hostname: &'a str,
    user_agent: &'a str,
    feature_negotiation: bool,
}

/// Check that `addr` looks like `host:port`, without resolving it.
fn validate_address(addr: &str) -> Result<()> {
    if addr.parse::<SocketAddr>().is_ok() {
        return Ok(());
    }
    let bad = |why: &str| Error::BadBrokerAddress {
        addr: addr.to_string(),
        source: why.into(),
        back: Backtrace::new(),
    };
    let (host, port) = addr.rsplit_once(':').ok_or_else(|| bad("expected host:port"))?;
    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(bad("bad host"));
    }
    port.parse::<u16>().map_err(|_| bad("bad port"))?;
    Ok(())
}

/// Publishing via a TCP connection to a single nsqd.
pub struct NsqTransport {
    addr: String,
    identify: Vec<u8>,
    conn: Option<TcpStream>,
    closed: bool,
}

impl NsqTransport {
    /// Construct a [`Transport`] implementation publishing to nsqd at `addr`.
    ///
    /// `addr` is only checked for shape here; it's resolved each time a connection is made, which
    /// isn't until the first publish. The producer introduces itself with `user_agent` &
    /// `hostname`.
    pub fn new(addr: &str, user_agent: &str, hostname: &str) -> Result<NsqTransport> {
        validate_address(addr)?;
        let identify = serde_json::to_vec(&Identify {
            client_id: hostname,
            hostname,
            user_agent,
            feature_negotiation: false,
        })
        .map_err(|err| Error::Serialization {
            source: err,
            back: Backtrace::new(),
        })?;
        Ok(NsqTransport {
            addr: addr.to_string(),
            identify,
            conn: None,
            closed: false,
        })
    }
    /// Construct a [`Transport`] implementation publishing to nsqd at localhost:4150
    pub fn local(user_agent: &str, hostname: &str) -> Result<NsqTransport> {
        NsqTransport::new(DEFAULT_NSQD_ADDRESS, user_agent, hostname)
    }
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
    fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = self
            .addr
            .to_socket_addrs()
            .map_err(|err| Error::BadBrokerAddress {
                addr: self.addr.clone(),
                source: Box::new(err),
                back: Backtrace::new(),
            })?
            .collect();
        if addrs.is_empty() {
            return Err(Error::BadBrokerAddress {
                addr: self.addr.clone(),
                source: "no addresses found".into(),
                back: Backtrace::new(),
            });
        }
        Ok(addrs)
    }
    fn connect(&self) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(&self.resolve()?[..])?;
        stream.set_nodelay(true)?;
        stream.write_all(MAGIC_V2)?;
        stream.write_all(&command_with_body("IDENTIFY", &self.identify))?;
        read_response(&mut stream)?;
        tracing::debug!(
            target: crate::LOCAL_TARGET,
            "Connected to nsqd at {:?}",
            stream.peer_addr()
        );
        Ok(stream)
    }
}

impl Transport for NsqTransport {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        let mut stream = match self.conn.take() {
            Some(stream) => stream,
            None => self.connect()?,
        };
        stream
            .write_all(&pub_command(topic, payload))
            .map_err(Error::from)
            .and_then(|_| read_response(&mut stream))?;
        // Only a connection that's still in a known-good state is kept; nsqd hangs up on clients
        // after most errors anyway.
        self.conn = Some(stream);
        Ok(())
    }
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        self.closed = true;
        if let Some(stream) = self.conn.take() {
            stream.shutdown(Shutdown::Both)?;
        }
        Ok(())
    }
}
