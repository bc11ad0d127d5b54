//! Hardware-independent network socket interface
//!
//! The data model (addresses, handles, options, errors) shared by every
//! concrete stack, the [`NetworkStack`] operation table they implement, and
//! the generic layer ([`StackHandle`]) that sockets call through.

pub mod addr;
pub mod buffer;
pub mod clock;
pub mod dns;
pub mod error;
pub mod event;
pub mod options;
pub mod socket;
pub mod stack;
pub mod types;

pub use addr::{IpAddress, IpVersion, MacAddress};
pub use clock::{Clock, TickClock};
pub use error::{ErrorClass, NetError, NetResult};
pub use event::{EventQueue, SocketEvent, SocketNotify};
pub use options::{OptionId, OptionLevel, StandardOption};
pub use socket::{SocketHandle, SocketPool, SocketState};
pub use stack::{default_stack, register_default_stack, NetworkStack, StackConfig, StackHandle};
pub use types::{Protocol, Security, Ssid, WifiAccessPoint};
