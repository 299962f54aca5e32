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

//! Test doubles: an in-memory [`Transport`], an in-memory stream & a fake nsqd.

use crate::{
    envelope::Envelope,
    error::{Error, Result},
    layer::MessageEventVisitor,
    transport::Transport,
    LOCAL_TARGET,
};

use bytes::BufMut;
use parking_lot::Mutex;
use tracing_subscriber::layer::{Context, Layer};

use std::{
    io::{BufRead, BufReader, Read, Write},
    net::{SocketAddr, TcpListener},
    sync::Arc,
    thread::JoinHandle,
};

/// Encode a frame as nsqd would send it.
pub fn encode_frame(frame_type: u32, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + data.len());
    buf.put_u32(data.len() as u32 + 4);
    buf.put_u32(frame_type);
    buf.put_slice(data);
    buf
}

/// A [`Layer`] remembering the message of every event on our own diagnostic target.
#[derive(Clone, Default)]
pub struct LocalEchoes {
    messages: Arc<Mutex<Vec<String>>>,
}

impl LocalEchoes {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
    /// How many times `msg` was logged locally.
    pub fn count(&self, msg: &str) -> usize {
        self.messages.lock().iter().filter(|m| *m == msg).count()
    }
}

impl<S: tracing::Subscriber> Layer<S> for LocalEchoes {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != LOCAL_TARGET {
            return;
        }
        let mut visitor = MessageEventVisitor { message: None };
        event.record(&mut visitor);
        if let Some(msg) = visitor.message {
            self.messages.lock().push(msg);
        }
    }
}

/// Reads come from a canned buffer; writes are collected.
pub struct FakeStream {
    input: std::io::Cursor<Vec<u8>>,
    pub output: Vec<u8>,
}

impl FakeStream {
    pub fn new(input: Vec<u8>) -> FakeStream {
        FakeStream {
            input: std::io::Cursor::new(input),
            output: Vec::new(),
        }
    }
}

impl Read for FakeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.input.read(buf)
    }
}

impl Write for FakeStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.output.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct Recorded {
    published: Vec<(String, Vec<u8>)>,
    closes: usize,
}

/// A [`Transport`] that remembers everything published through it. Clones share their record.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    record: Arc<Mutex<Recorded>>,
    fail: bool,
}

impl RecordingTransport {
    /// A transport whose every publish fails (after being recorded).
    pub fn failing() -> RecordingTransport {
        RecordingTransport {
            record: Arc::default(),
            fail: true,
        }
    }
    pub fn topics(&self) -> Vec<String> {
        self.record
            .lock()
            .published
            .iter()
            .map(|(topic, _)| topic.clone())
            .collect()
    }
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.record
            .lock()
            .published
            .iter()
            .map(|(_, payload)| Envelope::from_payload(payload).unwrap())
            .collect()
    }
    pub fn messages(&self) -> Vec<String> {
        self.envelopes()
            .iter()
            .map(|env| env.msg().to_string())
            .collect()
    }
    pub fn closes(&self) -> usize {
        self.record.lock().closes
    }
}

impl Transport for RecordingTransport {
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<()> {
        self.record
            .lock()
            .published
            .push((topic.to_string(), payload.to_vec()));
        if self.fail {
            Err(Error::Broker {
                message: "E_PUB_FAILED".to_string(),
                back: backtrace::Backtrace::new(),
            })
        } else {
            Ok(())
        }
    }
    fn close(&mut self) -> Result<()> {
        let mut record = self.record.lock();
        record.closes += 1;
        if record.closes > 1 {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

/// What a [`FakeNsqd`] saw over one connection.
pub struct Session {
    pub magic: Vec<u8>,
    /// (command line, body) pairs
    pub commands: Vec<(String, Vec<u8>)>,
}

/// Accepts a single connection, answers `OK` to IDENTIFY plus `n_pubs` body-carrying commands,
/// then hands back what it saw.
pub struct FakeNsqd {
    addr: SocketAddr,
    handle: JoinHandle<Session>,
}

impl FakeNsqd {
    pub fn start(n_pubs: usize) -> FakeNsqd {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut magic = vec![0u8; 4];
            reader.read_exact(&mut magic).unwrap();
            let mut commands = Vec::new();
            while commands.len() < n_pubs + 1 {
                let mut line = Vec::new();
                if reader.read_until(b'\n', &mut line).unwrap() == 0 {
                    break;
                }
                let line = String::from_utf8(line).unwrap().trim_end().to_string();
                let mut size = [0u8; 4];
                reader.read_exact(&mut size).unwrap();
                let mut body = vec![0u8; u32::from_be_bytes(size) as usize];
                reader.read_exact(&mut body).unwrap();
                writer.write_all(&encode_frame(0, b"OK")).unwrap();
                commands.push((line, body));
            }
            Session { magic, commands }
        });
        FakeNsqd { addr, handle }
    }
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
    pub fn join(self) -> Session {
        self.handle.join().unwrap()
    }
}
