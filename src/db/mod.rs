pub mod executor;
pub mod pool;

pub use executor::{PgQueryExecutor, QueryExecutor};
pub use pool::create_pool;
