//! Wire protocol for the control plane channel
//!
//! Every frame is a JSON object with PascalCase field names and an `Action`
//! discriminant. Inbound frames are first parsed into an [`InboundEnvelope`]
//! and only then decoded into the typed payload for their action.

pub mod actions;
pub mod envelope;
pub mod messages;

pub use envelope::*;
pub use messages::*;
