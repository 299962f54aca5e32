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

//! Test publishing to an nsqd on port 4150 on the local host, logging both before & after the
//! logger is initialized.

use nsq_tracing::{nsq_error, nsq_info, nsq_trace, Logger, Options};

pub fn main() {
    // Echo the logger's own diagnostics to stdout.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .init();

    let logger: Logger = Logger::new();
    nsq_info!(logger, "Hello, {}! (queued)", "世界");

    logger
        .initialize(
            &Options::builder()
                .application_name("tcp-test")
                .extra_tag("test", "tcp")
                .build(),
        )
        .unwrap();

    nsq_trace!(logger, "Hello, {}!", "世界");
    nsq_info!(logger, "Hello, {}!", "世界");
    nsq_error!(logger, "Hello, {}!", "世界");
    logger.println("Hello, 世界!");

    logger.close().unwrap();
}
