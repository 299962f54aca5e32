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

//! The [`Logger`] handle & its [`Options`].
//!
//! A [`Logger`] may be created before the application knows enough to talk to NSQ; calls made in
//! the meantime are queued, and published (in order) on the first call after an [`Instance`] is
//! attached. [`Logger::init`] does both in one step.

use crate::{
    dispatcher::{DispatchState, Dispatcher, Instance},
    envelope::Arguments,
    error::Result,
    identity::{hostname_or_loopback, AppName, IdentityTags},
    queue::{LogCall, QueueLimit},
    severity::Severity,
    transport::{validate_topic, NsqTransport, Transport, DEFAULT_NSQD_ADDRESS, TOPIC},
    LOCAL_TARGET,
};

use parking_lot::Mutex;

use std::{collections::BTreeMap, sync::Arc};

/// Logger configuration.
#[derive(Clone, Debug, Default)]
pub struct Options {
    application_name: String,
    broker_address: Option<String>,
    extra_tags: BTreeMap<String, String>,
    hostname: Option<String>,
    queue_limit: QueueLimit,
    user_agent: Option<String>,
}

pub struct OptionsBuilder {
    imp: Options,
}

impl OptionsBuilder {
    /// Required; initialization fails without it.
    pub fn application_name<S: Into<String>>(mut self, name: S) -> Self {
        self.imp.application_name = name.into();
        self
    }
    /// The nsqd to publish to; defaults to [`DEFAULT_NSQD_ADDRESS`].
    pub fn broker_address<S: Into<String>>(mut self, addr: S) -> Self {
        self.imp.broker_address = Some(addr.into());
        self
    }
    pub fn extra_tag<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.imp.extra_tags.insert(key.into(), value.into());
        self
    }
    pub fn extra_tags<I, K, V>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.imp
            .extra_tags
            .extend(tags.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
    /// Skip discovery & identify this host as `hostname`.
    pub fn hostname<S: Into<String>>(mut self, hostname: S) -> Self {
        self.imp.hostname = Some(hostname.into());
        self
    }
    /// Cap the backlog of a logger made with [`Logger::with_options`].
    pub fn queue_limit(mut self, limit: QueueLimit) -> Self {
        self.imp.queue_limit = limit;
        self
    }
    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.imp.user_agent = Some(user_agent.into());
        self
    }
    pub fn build(self) -> Options {
        self.imp
    }
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder {
            imp: Options::default(),
        }
    }
    pub fn queue_limit(&self) -> QueueLimit {
        self.queue_limit
    }
    fn broker_address(&self) -> &str {
        match self.broker_address.as_deref() {
            Some(addr) if !addr.is_empty() => addr,
            _ => {
                tracing::warn!(
                    target: LOCAL_TARGET,
                    "NSQ address not defined, using default {}",
                    DEFAULT_NSQD_ADDRESS
                );
                DEFAULT_NSQD_ADDRESS
            }
        }
    }
    /// Validate the application name & work out the identity tags.
    fn identity(&self) -> Result<(AppName, IdentityTags)> {
        let app = AppName::new(self.application_name.clone())?;
        let hostname = self.hostname.clone().unwrap_or_else(hostname_or_loopback);
        let tags = IdentityTags::new(hostname, &app, self.extra_tags.clone());
        Ok((app, tags))
    }
}

impl Instance<NsqTransport> {
    /// Build an instance publishing to nsqd as configured by `options`.
    ///
    /// Nothing is built (and so nothing will ever be published) if the application name is
    /// missing.
    pub fn from_options(options: &Options) -> Result<Instance<NsqTransport>> {
        let (app, tags) = options.identity()?;
        validate_topic(TOPIC)?;
        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("{} nsq-tracing/{}", app, env!("CARGO_PKG_VERSION")));
        let transport =
            NsqTransport::new(options.broker_address(), &user_agent, tags.hostname())?;
        Ok(Instance::new(tags, transport))
    }
}

impl<T: Transport> Instance<T> {
    /// Build an instance publishing through `transport`; the broker address & user agent in
    /// `options` are ignored.
    pub fn with_transport(options: &Options, transport: T) -> Result<Instance<T>> {
        let (_, tags) = options.identity()?;
        Ok(Instance::new(tags, transport))
    }
}

/// The handle through which an application logs.
///
/// Cheap to clone; clones share one [`Dispatcher`]. The owner that initialized it is responsible
/// for calling [`Logger::close`] once, at shutdown.
pub struct Logger<T: Transport = NsqTransport> {
    inner: Arc<Mutex<Dispatcher<T>>>,
}

impl<T: Transport> Clone for Logger<T> {
    fn clone(&self) -> Self {
        Logger {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Transport> std::default::Default for Logger<T> {
    fn default() -> Self {
        Logger::new()
    }
}

impl<T: Transport> Logger<T> {
    /// A logger with no producer yet; everything logged is queued until one is attached.
    pub fn new() -> Logger<T> {
        Logger::with_queue_limit(QueueLimit::Unbounded)
    }
    pub fn with_queue_limit(limit: QueueLimit) -> Logger<T> {
        Logger {
            inner: Arc::new(Mutex::new(Dispatcher::new(limit))),
        }
    }
    /// A logger with no producer yet, whose backlog is capped per `options`.
    ///
    /// The limit can only be set here: by the time a producer is attached the backlog is already
    /// built.
    pub fn with_options(options: &Options) -> Logger<T> {
        Logger::with_queue_limit(options.queue_limit())
    }
    /// Attach a producer; the next call will flush the backlog.
    pub fn attach(&self, instance: Instance<T>) -> Result<()> {
        self.inner.lock().attach(instance)
    }
    pub fn state(&self) -> DispatchState {
        self.inner.lock().state()
    }
    /// The number of calls waiting for a flush.
    pub fn pending(&self) -> usize {
        self.inner.lock().pending()
    }
    pub fn tags(&self) -> Option<IdentityTags> {
        self.inner.lock().tags().cloned()
    }
    pub fn log(&self, call: LogCall) {
        self.inner.lock().dispatch(call)
    }
    /// Log `template`, formatted with `args`, with severity "debug".
    pub fn trace(&self, template: &str, args: &[&dyn std::fmt::Display]) {
        self.log(LogCall::new(
            template,
            Severity::Debug,
            Arguments::from_display(args),
        ))
    }
    /// Log `template`, formatted with `args`, with severity "info".
    pub fn info(&self, template: &str, args: &[&dyn std::fmt::Display]) {
        self.log(LogCall::new(
            template,
            Severity::Info,
            Arguments::from_display(args),
        ))
    }
    /// Log `template`, formatted with `args`, with severity "error".
    pub fn error(&self, template: &str, args: &[&dyn std::fmt::Display]) {
        self.log(LogCall::new(
            template,
            Severity::Error,
            Arguments::from_display(args),
        ))
    }
    /// Log `line` verbatim with severity "info".
    pub fn println(&self, line: &str) {
        self.log(LogCall::new(line, Severity::Info, Arguments::Verbatim))
    }
    /// Stop the producer.
    pub fn close(&self) -> Result<()> {
        self.inner.lock().close()
    }
}

impl Logger<NsqTransport> {
    /// Create a logger publishing to nsqd as configured by `options`.
    pub fn init(options: Options) -> Result<Logger<NsqTransport>> {
        let instance = Instance::from_options(&options)?;
        let logger = Logger::with_queue_limit(options.queue_limit());
        logger.attach(instance)?;
        Ok(logger)
    }
    /// Like [`Logger::init`], but a failure is fatal: it's logged & the process exits.
    pub fn init_or_exit(options: Options) -> Logger<NsqTransport> {
        Logger::init(options).unwrap_or_else(|err| {
            tracing::error!(target: LOCAL_TARGET, "Failed to initialize: {}", err);
            std::process::exit(1);
        })
    }
    /// Attach a producer built from `options` to this (pre-existing) logger.
    pub fn initialize(&self, options: &Options) -> Result<()> {
        self.attach(Instance::from_options(options)?)
    }
}
