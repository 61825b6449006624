pub mod builder;
pub mod connection_pool;
pub mod driver;
pub mod pool_state_tracker;

pub use connection_pool::PgConnectionPool;
pub use driver::PoolDriver;
pub use pool_state_tracker::PoolStateTracker;
