// src/protocol/mod.rs
// Framed message codec (C1) and message model (C2)

pub mod codec;
pub mod message;

pub use codec::{FramedReader, FramedWriter, Outbound, ReadOutcome};
pub use message::{codes, Message, MessageId, RpcError};
