//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod clock;
mod mailbox;
mod repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use mailbox::MailboxGateway;
pub use repository::{DirectorySource, Repository};
