// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-bus protocol between the daemon and its clients.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod request;
mod response;
mod wire;

pub use request::ClientRequest;
pub use response::DaemonMessage;
pub use wire::{
    decode, encode, read_frame, read_frame_timeout, write_frame, write_frame_timeout,
    ProtocolError, DEFAULT_TIMEOUT, MAX_MESSAGE_SIZE,
};
