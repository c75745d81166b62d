//! gatewatch-wire — Frame transport between the camera node and the recognizer.
//!
//! One TCP connection, one direction, one peer. Each message is a 4-byte
//! big-endian length prefix followed by an opaque payload (an encoded JPEG).

pub mod codec;
pub mod error;
pub mod listener;

pub use codec::{FrameReader, FrameWriter, DEFAULT_MAX_FRAME_LEN, LENGTH_PREFIX_LEN};
pub use error::TransportError;
pub use listener::FrameListener;
