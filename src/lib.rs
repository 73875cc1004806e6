pub mod broker_state;
pub mod codec;
pub mod config;
pub mod connection;
pub mod constants;
pub mod encoder;
pub mod packets;
pub mod parser;
pub mod protocol;
pub mod router;
pub mod server;
pub mod session;
