pub mod db_ops;
pub mod helper;

pub use db_ops::{ConnectionConfig, ConnectionState, HealthReport, ResilientConnectionManager};
