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
//! A logging client that publishes structured log envelopes to [NSQ].
//!
//! [NSQ]: https://nsq.io
//!
//! # Introduction
//!
//! Each log call made through a [`Logger`] is wrapped in an [`Envelope`]: the process' identity
//! (an address for this host, the application name & any extra tags), a fresh UUID, a timestamp,
//! a severity and the message itself. The envelope is serialized as JSON under a `"data"` key and
//! published to the `log.raw#ephemeral` topic:
//!
//! ```text
//! {"data": {"hostname": "10.0.0.7", "application": "billing", "region": "us",
//!           "uuid": "...", "msg": "charged 42", "timestamp": "2025-06-23T16:10:55+02:00",
//!           "severity": "info"}}
//! ```
//!
//! Applications frequently want to log before they know where to send their logs. A [`Logger`]
//! can be created with no producer at all: calls made then are queued (and echoed to whatever
//! [`tracing`] subscriber is installed), and the first call after a producer is attached publishes
//! the whole backlog, in order, ahead of itself.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! Delivery is fire-and-forget: a failed publish is logged locally & the message is dropped.
//!
//! # Usage
//!
//! ```no_run
//! use nsq_tracing::{nsq_info, nsq_println, Logger, Options};
//!
//! let logger = Logger::init_or_exit(
//!     Options::builder()
//!         .application_name("billing")
//!         .broker_address("nsqd.internal:4150")
//!         .extra_tag("region", "us")
//!         .build(),
//! );
//!
//! nsq_println!(logger, "Hello, world!");
//! nsq_info!(logger, "charged {} to account {}", 42, "acct-7");
//!
//! logger.close().unwrap();
//! ```
//!
//! Logging before initialization:
//!
//! ```no_run
//! use nsq_tracing::{Logger, Options};
//!
//! let logger: Logger = Logger::new();
//! logger.info("starting up, pid {}", &[&std::process::id()]); // queued
//!
//! logger
//!     .initialize(&Options::builder().application_name("billing").build())
//!     .unwrap();
//! logger.println("ready"); // publishes the queued call, then this one
//! ```
//!
//! Or route [`tracing`] events through the logger with [`NsqLayer`]:
//!
//! ```no_run
//! use nsq_tracing::{Logger, NsqLayer, Options};
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let logger = Logger::init(Options::builder().application_name("billing").build()).unwrap();
//! let subscriber = Registry::default().with(NsqLayer::new(logger.clone()));
//! let _guard = tracing::subscriber::set_default(subscriber);
//!
//! tracing::info!("Hello, world!");
//! ```

pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod layer;
pub mod logger;
pub mod queue;
pub mod severity;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use dispatcher::{DispatchState, Instance};
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use layer::NsqLayer;
pub use logger::{Logger, Options};
pub use queue::QueueLimit;
pub use severity::Severity;

/// The target of this crate's own diagnostics.
pub const LOCAL_TARGET: &str = "nsq_tracing";

/// Log with severity "debug": `nsq_trace!(logger, "{} of {}", a, b)`.
#[macro_export]
macro_rules! nsq_trace {
    ($logger:expr, $template:expr $(,)?) => {
        $logger.trace($template, &[])
    };
    ($logger:expr, $template:expr, $($arg:expr),+ $(,)?) => {
        $logger.trace($template, &[$(&$arg as &dyn ::std::fmt::Display),+])
    };
}

/// Log with severity "info": `nsq_info!(logger, "{} of {}", a, b)`.
#[macro_export]
macro_rules! nsq_info {
    ($logger:expr, $template:expr $(,)?) => {
        $logger.info($template, &[])
    };
    ($logger:expr, $template:expr, $($arg:expr),+ $(,)?) => {
        $logger.info($template, &[$(&$arg as &dyn ::std::fmt::Display),+])
    };
}

/// Log with severity "error": `nsq_error!(logger, "{} of {}", a, b)`.
#[macro_export]
macro_rules! nsq_error {
    ($logger:expr, $template:expr $(,)?) => {
        $logger.error($template, &[])
    };
    ($logger:expr, $template:expr, $($arg:expr),+ $(,)?) => {
        $logger.error($template, &[$(&$arg as &dyn ::std::fmt::Display),+])
    };
}

/// Log a line verbatim with severity "info": `nsq_println!(logger, "ready")`.
#[macro_export]
macro_rules! nsq_println {
    ($logger:expr, $line:expr $(,)?) => {
        $logger.println($line)
    };
}
