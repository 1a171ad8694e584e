//! Transport layer
//!
//! - `serial`: the device port (tokio-serial)
//! - `mock`: in-memory pipe for tests and dry runs

pub mod mock;
pub mod serial;
pub mod traits;

pub use mock::{MockDevice, MockTransport};
pub use serial::{SerialTransport, SerialTransportConfig};
pub use traits::{
    ConnectionState, Transport, TransportError, TransportReader, TransportStats, TransportWriter,
};
