//! Network stack implementations
//!
//! Each stack implements [`crate::net::NetworkStack`] and is wrapped in a
//! [`crate::net::StackHandle`] at system init.

pub mod loopback;

pub use loopback::{LoopbackConfig, LoopbackStack, LoopbackStats};
