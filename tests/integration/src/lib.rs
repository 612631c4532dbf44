//! End-to-end tests of the live-stream control path
//!
//! This test suite validates:
//! - Capacity reports flowing into capability queries
//! - Start / update / stop against a simulated device gateway
//! - Reply correlation under concurrent sessions and out-of-order replies
//! - Timeout, late-reply and shutdown behaviour

pub mod test_utils;

#[cfg(test)]
mod live_stream_flow_tests;

#[cfg(test)]
mod correlation_under_load_tests;
