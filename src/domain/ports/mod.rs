//! Port trait definitions (Hexagonal Architecture)
//!
//! - `ProviderTransport`: encodes normalized requests and decodes provider responses
//! - `CompletionClient`: the operations collaborators call
//!
//! Collaborators depend on these traits rather than on the concrete client,
//! so one client per credential/provider pair can be injected where needed.

pub mod completion_client;
pub mod provider_transport;

pub use completion_client::{CompletionClient, OnFragment};
pub use provider_transport::{EncodedRequest, ProviderTransport};
