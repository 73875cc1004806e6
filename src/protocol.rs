pub mod decoding;
pub mod encoding;
pub mod error;
pub mod packet_type;
pub mod qos;
pub mod validation;

pub use error::{DecodeError, EncodeError};
pub use packet_type::ControlPacketType;
pub use qos::Qos;
