//! Domain model for inbox requests and the directory records they mutate.
//!
//! # Responsibility
//! - Define the canonical shapes shared by stores, processors and services.
//!
//! # Invariants
//! - Inbox entries are identified by a stable integer id plus a uuid.
//! - `applied` and `discarded` are terminal inbox states.

pub mod directory;
pub mod inbox;
