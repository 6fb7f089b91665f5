//! Reassemble images from serial camera streams.
//!
//! A camera board streams JPEG frames over a serial link, each one wrapped in
//! delimiter lines and a `Content-Length` header. camstream turns that byte
//! stream back into whole images, whatever the chunking and however noisy the
//! line.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte sources (serial devices, FIFOs, sockets, memory)
//! - [`frame`]: bounded reassembly, the session driver and frame sinks

/// Re-export transport types.
pub mod transport {
    pub use camstream_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use camstream_frame::*;
}
