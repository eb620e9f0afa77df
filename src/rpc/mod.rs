//! RPC surface: `MasterService` and `MessageService` over MessagePack-encoded
//! HTTP POST bodies.

pub mod client;
pub mod server;
pub mod wire;
