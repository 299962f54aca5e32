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

//! The backlog of log calls made before the first flush.
//!
//! [`PendingQueue`] is strictly FIFO. By default it is unbounded: an application that never
//! attaches a producer will grow it without limit. [`QueueLimit`] trades that for a cap.

use crate::{envelope::Arguments, severity::Severity};

use std::collections::VecDeque;

/// A single log call, exactly as the application made it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogCall {
    pub template: String,
    pub severity: Severity,
    pub arguments: Arguments,
}

impl LogCall {
    pub fn new<S: Into<String>>(template: S, severity: Severity, arguments: Arguments) -> LogCall {
        LogCall {
            template: template.into(),
            severity,
            arguments,
        }
    }
}

/// What to do when a capped queue is full.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum QueueLimit {
    /// Never refuse a call
    Unbounded,
    /// Hold at most N calls, evicting the oldest to make room
    DropOldest(usize),
    /// Hold at most N calls, refusing new ones once full
    Reject(usize),
}

impl std::default::Default for QueueLimit {
    fn default() -> Self {
        QueueLimit::Unbounded
    }
}

/// The result of [`PendingQueue::append`].
#[derive(Debug, PartialEq, Eq)]
pub enum Appended {
    Queued,
    /// The call was queued, but the oldest entry had to go
    Evicted(LogCall),
    /// The queue was full; the call is handed back
    Rejected(LogCall),
}

#[derive(Debug, Default)]
pub struct PendingQueue {
    calls: VecDeque<LogCall>,
    limit: QueueLimit,
}

impl PendingQueue {
    pub fn new(limit: QueueLimit) -> PendingQueue {
        PendingQueue {
            calls: VecDeque::new(),
            limit,
        }
    }
    pub fn append(&mut self, call: LogCall) -> Appended {
        match self.limit {
            QueueLimit::Unbounded => {
                self.calls.push_back(call);
                Appended::Queued
            }
            QueueLimit::DropOldest(cap) => {
                if cap == 0 {
                    return Appended::Rejected(call);
                }
                let evicted = if self.calls.len() >= cap {
                    self.calls.pop_front()
                } else {
                    None
                };
                self.calls.push_back(call);
                match evicted {
                    Some(old) => Appended::Evicted(old),
                    None => Appended::Queued,
                }
            }
            QueueLimit::Reject(cap) => {
                if self.calls.len() >= cap {
                    Appended::Rejected(call)
                } else {
                    self.calls.push_back(call);
                    Appended::Queued
                }
            }
        }
    }
    /// Hand back everything queued, oldest first, leaving the queue empty.
    pub fn drain_all(&mut self) -> Vec<LogCall> {
        self.calls.drain(..).collect()
    }
    pub fn len(&self) -> usize {
        self.calls.len()
    }
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
