use crate::errors::dberrors::{BackendError, BackendErrorKind};

/// Decides whether a backend failure means the connection is broken.
///
/// Connection-class failures make the manager heal itself; everything else
/// is handed back to the caller untouched. The right answer depends on the
/// database, so the manager takes this as an injected predicate. Closures
/// `Fn(&BackendError) -> bool` implement it too.
pub trait ErrorClassifier: Send + Sync {
    fn is_connection_error(&self, error: &BackendError) -> bool;
}

impl<F> ErrorClassifier for F
where
    F: Fn(&BackendError) -> bool + Send + Sync,
{
    fn is_connection_error(&self, error: &BackendError) -> bool {
        self(error)
    }
}

/// SQLSTATE based classifier.
///
/// Transport failures always count as connection errors. Database errors
/// match when their code starts with one of `class_prefixes` or equals one of
/// `codes`.
///
/// sqlx reports an unreachable server as a pool timeout, so a timeout is a
/// transport failure. A timeout on a pool with every connection busy is
/// reported by `PgConnectionPool` as an `Other` error instead and never
/// matches here.
#[derive(Debug, Clone)]
pub struct SqlStateClassifier {
    class_prefixes: Vec<String>,
    codes: Vec<String>,
}

impl SqlStateClassifier {
    /// Empty classifier, only transport failures match
    pub fn new() -> Self {
        Self {
            class_prefixes: Vec::new(),
            codes: Vec::new(),
        }
    }

    /// PostgreSQL: class 08 (connection exception) and 57P01 (admin shutdown)
    pub fn postgres() -> Self {
        Self::new().with_class_prefix("08").with_code("57P01")
    }

    pub fn with_class_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.class_prefixes.push(prefix.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.codes.push(code.into());
        self
    }
}

impl Default for SqlStateClassifier {
    fn default() -> Self {
        Self::postgres()
    }
}

impl ErrorClassifier for SqlStateClassifier {
    fn is_connection_error(&self, error: &BackendError) -> bool {
        if error.kind == BackendErrorKind::Transport {
            return true;
        }

        match error.code() {
            Some(code) => {
                self.codes.iter().any(|c| c == code)
                    || self.class_prefixes.iter().any(|p| code.starts_with(p.as_str()))
            }
            None => false,
        }
    }
}
