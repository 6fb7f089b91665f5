//! Byte sources for camera streams.
//!
//! A camera on the other end of a serial link just pushes bytes. This crate
//! hides where they come from behind one non-blocking, bounded call:
//! - serial devices, FIFOs and capture files (Linux/macOS)
//! - Unix domain sockets (serial bridges, test harnesses)
//! - scripted in-memory chunks
//!
//! This is the lowest layer of camstream. Frame reassembly builds on top of
//! the [`ByteSource`] trait provided here.

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(unix)]
pub mod device;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use memory::MemorySource;
pub use traits::{ByteSource, READ_CHUNK_SIZE};

#[cfg(unix)]
pub use device::DeviceSource;
#[cfg(unix)]
pub use uds::SocketSource;
