pub mod dberrors;
pub mod errors;

pub use dberrors::{BackendError, BackendErrorKind, DbError};
pub use errors::{ServiceError, ServiceResult};
