//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for exercising the session and
//! connectivity layers without a broker or a real network interface.

pub mod mocks;

pub use mocks::*;
