mod dir_store;
mod schema;
mod store;

pub use dir_store::DirStore;
pub use store::SqliteLedger;
