pub mod event_store;
pub mod memory;
pub mod postgres;

pub use event_store::EventStore;
pub use memory::MemoryEventStore;
pub use postgres::{create_pool, run_migrations, PgEventStore};

#[cfg(test)]
pub use event_store::MockEventStore;
