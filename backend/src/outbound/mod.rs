//! Outbound adapters implementing domain ports.
//!
//! - **enphase**: reqwest client for the vendor's monitoring and OAuth APIs
//! - **persistence**: PostgreSQL repositories using Diesel
//! - **memory**: process-local stores injected where no shared store is needed
//!
//! Adapters translate between domain types and infrastructure
//! representations and contain no business logic.

pub mod enphase;
pub mod memory;
pub mod persistence;
