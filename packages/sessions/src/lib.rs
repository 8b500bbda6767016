// ABOUTME: Session actors and the registry that hands them out
// ABOUTME: One actor per session id, all routed to the configured execution container

pub mod actor;
pub mod error;
pub mod registry;

pub use actor::Actor;
pub use error::{RegistryError, Result};
pub use registry::ActorRegistry;
