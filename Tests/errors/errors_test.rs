#[cfg(test)]
mod error_tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use reputation_shield_backend::datalayer::db_ops::constants::ConnectionState;
    use reputation_shield_backend::errors::errors::{
        ErrorDetail, ErrorResponse, ServiceError, ServiceResult, create_error_response,
    };
    use reputation_shield_backend::errors::{BackendError, BackendErrorKind, DbError};
    use serde_json;

    // Test error display messages
    #[test]
    fn test_service_error_display_messages() {
        let error = ServiceError::DatabaseError("duplicate key".to_string());
        assert_eq!(error.to_string(), "Database error: duplicate key");

        let error = ServiceError::DatabaseConnectionError;
        assert_eq!(error.to_string(), "Failed to connect to database");

        let error = ServiceError::ConfigurationError("missing DB_HOST".to_string());
        assert_eq!(error.to_string(), "Configuration error: missing DB_HOST");
    }

    #[test]
    fn test_db_error_display_messages() {
        let error = DbError::NotConnected {
            state: ConnectionState::Healing,
        };
        assert_eq!(error.to_string(), "database not connected (state: healing)");

        let error = DbError::Statement(BackendError::database("23505", "duplicate key"));
        assert_eq!(
            error.to_string(),
            "database statement error: duplicate key (code 23505)"
        );

        let error = DbError::ExhaustedRetries {
            attempts: 10,
            last_error: BackendError::transport(Some("ECONNREFUSED"), "connection refused"),
        };
        assert_eq!(
            error.to_string(),
            "database unreachable after 10 connection attempts: connection refused (code ECONNREFUSED)"
        );

        assert_eq!(
            DbError::Closed.to_string(),
            "database connection manager is closed"
        );
    }

    // Test HTTP status codes
    #[test]
    fn test_status_codes() {
        assert_eq!(
            ServiceError::DatabaseConnectionError.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ServiceError::DatabaseError("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::InternalServerError("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::ConfigurationError("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ServiceError::DatabaseError("x".to_string()).error_code(),
            "DATABASE_ERROR"
        );
        assert_eq!(
            ServiceError::DatabaseConnectionError.error_code(),
            "DATABASE_CONNECTION_ERROR"
        );
        assert_eq!(
            ServiceError::ConfigurationError("x".to_string()).error_code(),
            "CONFIGURATION_ERROR"
        );
    }

    // Test conversion from connection manager errors
    #[test]
    fn test_unavailable_db_errors_map_to_503() {
        let unavailable = vec![
            DbError::NotConnected {
                state: ConnectionState::Disconnected,
            },
            DbError::Connection(BackendError::transport(Some("ECONNRESET"), "reset")),
            DbError::ExhaustedRetries {
                attempts: 3,
                last_error: BackendError::transport(None, "pool timed out"),
            },
            DbError::Closed,
        ];

        for error in unavailable {
            assert!(error.is_unavailable());
            let service: ServiceError = error.into();
            assert_eq!(service.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    #[test]
    fn test_statement_error_keeps_message() {
        let error = DbError::Statement(BackendError::database("42601", "syntax error at or near \"FORM\""));
        assert!(!error.is_unavailable());
        assert_eq!(error.backend().map(|b| b.kind), Some(BackendErrorKind::Database));

        let service: ServiceError = error.into();
        match &service {
            ServiceError::DatabaseError(msg) => {
                assert!(msg.contains("42601"));
                assert!(msg.contains("syntax error"));
            }
            other => panic!("expected DatabaseError, got {:?}", other),
        }
        assert_eq!(service.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // Test error response format
    #[tokio::test]
    async fn test_error_response_format() {
        let error = ServiceError::DatabaseConnectionError;
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(error_response.error.code, "DATABASE_CONNECTION_ERROR");
        assert_eq!(error_response.error.message, "Failed to connect to database");
    }

    #[tokio::test]
    async fn test_create_error_response() {
        let response = create_error_response(StatusCode::NOT_FOUND, "NOT_FOUND", "no such route");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let error_response: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error_response.error.message, "no such route");
    }

    #[test]
    fn test_error_detail_serialization() {
        let detail = ErrorDetail {
            code: "DATABASE_ERROR".to_string(),
            message: "Database error: boom".to_string(),
        };
        let json = serde_json::to_value(&ErrorResponse { error: detail }).unwrap();

        assert_eq!(json["error"]["code"], "DATABASE_ERROR");
        assert_eq!(json["error"]["message"], "Database error: boom");
    }

    // Test ServiceResult with the ? operator
    fn load_rows(fail: bool) -> ServiceResult<u64> {
        let result: Result<u64, DbError> = if fail {
            Err(DbError::NotConnected {
                state: ConnectionState::Connecting,
            })
        } else {
            Ok(3)
        };
        Ok(result?)
    }

    #[test]
    fn test_service_result_question_mark() {
        assert_eq!(load_rows(false).unwrap(), 3);
        assert!(matches!(
            load_rows(true),
            Err(ServiceError::DatabaseConnectionError)
        ));
    }
}
