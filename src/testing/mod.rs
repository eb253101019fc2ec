//! Testing utilities and mock implementations
//!
//! Lets the channel run against scripted connectors and in-process
//! transports, without a control plane endpoint.

pub mod mocks;

pub use mocks::*;
