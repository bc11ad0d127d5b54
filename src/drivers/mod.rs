//! Concrete network stacks

pub mod net;
