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

//! A [`tracing-subscriber`] [`Layer`] that hands [`Event`]s to a [`Logger`].
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//!
//! Only the "message" field of each event is published; events without one are skipped. So are
//! events on the `nsq_tracing` target: those are the [`Logger`]'s own diagnostics, and publishing
//! them would loop.

use crate::{
    envelope::Arguments, logger::Logger, queue::LogCall, severity::Severity,
    transport::Transport, LOCAL_TARGET,
};

use tracing::Event;
use tracing_subscriber::layer::Context;

// When the tracing-log feature is enabled, use NormalizeEvent to recover the level & target of
// events that originated from the `log` crate.
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

pub(crate) struct MessageEventVisitor {
    pub(crate) message: Option<String>,
}

impl tracing::field::Visit for MessageEventVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            // The tracing macros "pre-format" the `message` field, so `value` is really a
            // `std::fmt::Arguments`, whose debug format has no enclosing double-quotes.
            self.message = Some(format!("{:?}", value));
        }
    }
}

fn is_own_diagnostic(target: &str) -> bool {
    target == LOCAL_TARGET
        || target
            .strip_prefix(LOCAL_TARGET)
            .map_or(false, |rest| rest.starts_with("::"))
}

pub struct NsqLayer<T: Transport> {
    logger: Logger<T>,
}

impl<T: Transport> NsqLayer<T> {
    pub fn new(logger: Logger<T>) -> NsqLayer<T> {
        NsqLayer { logger }
    }
    pub fn logger(&self) -> &Logger<T> {
        &self.logger
    }
}

impl<S, T> tracing_subscriber::layer::Layer<S> for NsqLayer<T>
where
    S: tracing::Subscriber,
    T: Transport + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        if is_own_diagnostic(meta.target()) {
            return;
        }

        let mut visitor = MessageEventVisitor { message: None };
        event.record(&mut visitor);
        if let Some(msg) = visitor.message {
            self.logger.log(LogCall::new(
                msg,
                Severity::from(meta.level()),
                Arguments::Verbatim,
            ));
        }
    }
}
