//! Test utilities for the CMS client and the stress test harness.
//!
//! This crate provides an in-process stand-in for the CMS, see [`server::TestServer`], and a
//! logger setup for tests.

pub mod server;
pub mod tracing;
