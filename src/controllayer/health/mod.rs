pub mod health;

pub use health::{HealthResponse, ReadinessResponse, health_check, liveness, readiness};
