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

//! Deciding, for each log call, whether to queue it or publish it.
//!
//! | state        | on a log call                                              | next state   |
//! |--------------|------------------------------------------------------------|--------------|
//! | `NoInstance` | queue it                                                   | `NoInstance` |
//! | `Buffering`  | publish the backlog, oldest first, then the call itself    | `Flushed`    |
//! | `Flushed`    | publish it                                                 | `Flushed`    |
//!
//! Every call is echoed to the local diagnostic sink exactly once, on arrival, whatever becomes
//! of it afterwards. [`Dispatcher`] is not itself synchronized; [`Logger`] holds it behind a
//! single mutex so that each call's decide-and-act sequence (the flush included) is indivisible.
//!
//! [`Logger`]: crate::logger::Logger

use crate::{
    envelope::{build_envelope, resolve_message},
    error::{Error, Result},
    identity::IdentityTags,
    queue::{Appended, LogCall, PendingQueue, QueueLimit},
    severity::Severity,
    transport::{Transport, TOPIC},
    LOCAL_TARGET,
};

/// Where a [`Dispatcher`] is in its lifecycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchState {
    /// No producer yet; calls are queued
    NoInstance,
    /// A producer has been attached but nothing has been published
    Buffering,
    /// Calls go straight to the producer; terminal
    Flushed,
}

/// A logger instance: the process' identity plus a producer.
pub struct Instance<T: Transport> {
    tags: IdentityTags,
    transport: T,
}

impl<T: Transport> Instance<T> {
    pub fn new(tags: IdentityTags, transport: T) -> Instance<T> {
        Instance { tags, transport }
    }
    pub fn tags(&self) -> &IdentityTags {
        &self.tags
    }
}

pub struct Dispatcher<T: Transport> {
    state: DispatchState,
    instance: Option<Instance<T>>,
    queue: PendingQueue,
}

fn echo_locally(call: &LogCall) {
    let msg = resolve_message(&call.template, &call.arguments);
    match call.severity {
        Severity::Debug => tracing::debug!(target: LOCAL_TARGET, "{}", msg),
        Severity::Info => tracing::info!(target: LOCAL_TARGET, "{}", msg),
        Severity::Error => tracing::error!(target: LOCAL_TARGET, "{}", msg),
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(limit: QueueLimit) -> Dispatcher<T> {
        Dispatcher {
            state: DispatchState::NoInstance,
            instance: None,
            queue: PendingQueue::new(limit),
        }
    }
    pub fn state(&self) -> DispatchState {
        self.state
    }
    /// The number of calls waiting for a flush.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
    pub fn tags(&self) -> Option<&IdentityTags> {
        self.instance.as_ref().map(Instance::tags)
    }
    /// `NoInstance` :=> `Buffering`; an instance may only be attached once.
    pub fn attach(&mut self, instance: Instance<T>) -> Result<()> {
        if self.state != DispatchState::NoInstance {
            return Err(Error::AlreadyInitialized);
        }
        self.instance = Some(instance);
        self.state = DispatchState::Buffering;
        Ok(())
    }
    /// The entry point for every log call.
    pub fn dispatch(&mut self, call: LogCall) {
        echo_locally(&call);
        match self.state {
            DispatchState::NoInstance => self.enqueue(call),
            DispatchState::Buffering => {
                self.flush();
                self.publish(&call);
            }
            DispatchState::Flushed => self.publish(&call),
        }
    }
    /// Release the producer. A backlog that no call has flushed yet is published first.
    pub fn close(&mut self) -> Result<()> {
        if self.state == DispatchState::Buffering {
            self.flush();
        }
        match self.instance.as_mut() {
            Some(instance) => instance.transport.close(),
            None => Ok(()),
        }
    }
    fn enqueue(&mut self, call: LogCall) {
        if self.queue.is_empty() {
            tracing::info!(
                target: LOCAL_TARGET,
                "Queuing messages until a producer is attached..."
            );
        }
        match self.queue.append(call) {
            Appended::Queued => (),
            Appended::Evicted(old) => tracing::warn!(
                target: LOCAL_TARGET,
                "Backlog full; dropped the oldest queued message ({:?})",
                old.template
            ),
            Appended::Rejected(new) => tracing::warn!(
                target: LOCAL_TARGET,
                "Backlog full; message {:?} won't be published",
                new.template
            ),
        }
    }
    /// `Buffering` :=> `Flushed`, in two phases: flip the state & take the backlog, then publish
    /// each entry directly. Nothing in here goes back through [`Dispatcher::dispatch`].
    fn flush(&mut self) {
        self.state = DispatchState::Flushed;
        let backlog = self.queue.drain_all();
        tracing::info!(
            target: LOCAL_TARGET,
            "Dumping to NSQ ({} queued message(s))",
            backlog.len()
        );
        for call in &backlog {
            self.publish(call);
        }
    }
    fn publish(&mut self, call: &LogCall) {
        let instance = match self.instance.as_mut() {
            Some(instance) => instance,
            None => return,
        };
        let env = build_envelope(
            &instance.tags,
            resolve_message(&call.template, &call.arguments),
        )
        .with_severity(call.severity);
        env.to_payload() // :=> Result<Vec<u8>>
            .and_then(|buf| instance.transport.publish(TOPIC, &buf))
            .unwrap_or_else(|err| {
                tracing::error!(target: LOCAL_TARGET, "Error publishing: {}", err);
            });
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::{
        envelope::Arguments,
        identity::AppName,
        test_utils::{LocalEchoes, RecordingTransport},
    };

    use tracing_subscriber::{layer::SubscriberExt, registry::Registry};

    fn call(template: &str) -> LogCall {
        LogCall::new(template, Severity::Info, Arguments::Verbatim)
    }

    fn instance(transport: RecordingTransport) -> Instance<RecordingTransport> {
        Instance::new(
            IdentityTags::new(
                "10.1.2.3".to_string(),
                &AppName::try_from("prototyping").unwrap(),
                vec![("region", "us")],
            ),
            transport,
        )
    }

    #[test]
    fn queue_then_flush() {
        let transpo = RecordingTransport::default();
        let mut d = Dispatcher::new(QueueLimit::Unbounded);
        assert_eq!(d.state(), DispatchState::NoInstance);

        d.dispatch(call("hello"));
        d.dispatch(LogCall::new(
            "{} {}",
            Severity::Error,
            Arguments::from_display(&[&"second", &2]),
        ));
        assert_eq!(d.state(), DispatchState::NoInstance);
        assert_eq!(d.pending(), 2);
        assert!(transpo.messages().is_empty());

        d.attach(instance(transpo.clone())).unwrap();
        assert_eq!(d.state(), DispatchState::Buffering);
        assert_eq!(d.pending(), 2);
        assert!(transpo.messages().is_empty());

        d.dispatch(call("world"));
        assert_eq!(d.state(), DispatchState::Flushed);
        assert_eq!(d.pending(), 0);
        assert_eq!(transpo.messages(), vec!["hello", "second 2", "world"]);

        let envs = transpo.envelopes();
        assert_eq!(envs[0].severity(), Some(Severity::Info));
        assert_eq!(envs[1].severity(), Some(Severity::Error));
        assert!(envs.iter().all(|env| env.tag("region") == Some("us")));
        assert!(transpo.topics().iter().all(|t| t == TOPIC));

        d.dispatch(call("again"));
        assert_eq!(
            transpo.messages(),
            vec!["hello", "second 2", "world", "again"]
        );
    }

    #[test]
    fn echoed_locally_once() {
        let echoes = LocalEchoes::default();
        let _guard = tracing::subscriber::set_default(Registry::default().with(echoes.clone()));

        let transpo = RecordingTransport::default();
        let mut d = Dispatcher::new(QueueLimit::Unbounded);
        d.dispatch(call("one"));
        d.dispatch(LogCall::new(
            "{}",
            Severity::Debug,
            Arguments::from_display(&[&"two"]),
        ));
        // Queued calls are echoed on arrival...
        assert_eq!(echoes.count("one"), 1);
        assert_eq!(echoes.count("two"), 1);

        d.attach(instance(transpo.clone())).unwrap();
        d.dispatch(call("three"));
        // but not again when the backlog goes out.
        for m in ["one", "two", "three"] {
            assert_eq!(echoes.count(m), 1, "{:?} echoed more than once", m);
        }
        let echoed: Vec<String> = echoes
            .messages()
            .into_iter()
            .filter(|m| ["one", "two", "three"].contains(&m.as_str()))
            .collect();
        assert_eq!(echoed, vec!["one", "two", "three"]);
        assert_eq!(transpo.messages(), vec!["one", "two", "three"]);
    }

    #[test]
    fn attach_once() {
        let mut d = Dispatcher::new(QueueLimit::Unbounded);
        d.attach(instance(RecordingTransport::default())).unwrap();
        assert!(matches!(
            d.attach(instance(RecordingTransport::default())),
            Err(Error::AlreadyInitialized)
        ));
        d.dispatch(call("x"));
        assert!(matches!(
            d.attach(instance(RecordingTransport::default())),
            Err(Error::AlreadyInitialized)
        ));
        assert_eq!(d.state(), DispatchState::Flushed);
    }

    #[test]
    fn publish_failures_are_not_requeued() {
        let transpo = RecordingTransport::failing();
        let mut d = Dispatcher::new(QueueLimit::Unbounded);
        d.dispatch(call("one"));
        d.attach(instance(transpo.clone())).unwrap();
        d.dispatch(call("two"));
        d.dispatch(call("three"));
        // Each was attempted exactly once, and nothing went back on the queue.
        assert_eq!(transpo.messages(), vec!["one", "two", "three"]);
        assert_eq!(d.pending(), 0);
        assert_eq!(d.state(), DispatchState::Flushed);
    }

    #[test]
    fn capped_backlog() {
        let transpo = RecordingTransport::default();
        let mut d = Dispatcher::new(QueueLimit::DropOldest(2));
        for m in ["a", "b", "c", "d"] {
            d.dispatch(call(m));
        }
        assert_eq!(d.pending(), 2);
        d.attach(instance(transpo.clone())).unwrap();
        d.dispatch(call("e"));
        assert_eq!(transpo.messages(), vec!["c", "d", "e"]);
    }

    #[test]
    fn close_flushes_backlog() {
        let transpo = RecordingTransport::default();
        let mut d = Dispatcher::new(QueueLimit::Unbounded);
        d.dispatch(call("early"));
        d.attach(instance(transpo.clone())).unwrap();
        d.close().unwrap();
        assert_eq!(d.state(), DispatchState::Flushed);
        assert_eq!(transpo.messages(), vec!["early"]);
        assert_eq!(transpo.closes(), 1);
        assert!(matches!(d.close(), Err(Error::Closed)));
    }

    #[test]
    fn close_without_instance() {
        let mut d: Dispatcher<RecordingTransport> = Dispatcher::new(QueueLimit::Unbounded);
        d.dispatch(call("nobody listening"));
        assert!(d.close().is_ok());
        assert_eq!(d.state(), DispatchState::NoInstance);
    }
}
