//! Records, and the storage port shared by the enrichment pipeline and the records API.
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;
