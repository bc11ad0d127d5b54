#![cfg_attr(not(test), no_std)]

// Protocol-independent socket model and the stack interface
pub mod net;

// Concrete stacks
pub mod drivers;

pub mod task;

pub use drivers::net::{LoopbackConfig, LoopbackStack};
pub use net::{IpAddress, IpVersion, NetError, NetResult, NetworkStack, SocketHandle, StackHandle};
