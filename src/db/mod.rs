pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::MemoryCatalogStore;
pub use postgres::{create_pool, run_migrations, PgCatalogStore};
#[cfg(test)]
pub use store::MockCatalogStore;
pub use store::{CatalogCounts, CatalogStore, MovieQuery};
