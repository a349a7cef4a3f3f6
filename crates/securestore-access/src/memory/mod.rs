//! In-process capability backend

mod store;

pub use store::InMemoryCapabilityStore;
