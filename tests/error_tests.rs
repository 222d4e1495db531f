// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use roundup_tracker::error::AppError;

#[test]
fn test_status_codes() {
    let cases = [
        (AppError::OwnerNotFound(1), StatusCode::NOT_FOUND),
        (
            AppError::InvalidMonthFormat("x".to_string()),
            StatusCode::BAD_REQUEST,
        ),
        (AppError::BadRequest("x".to_string()), StatusCode::BAD_REQUEST),
        (
            AppError::AuthenticationFailure("x".to_string()),
            StatusCode::UNAUTHORIZED,
        ),
        (
            AppError::RemoteServiceFailure("x".to_string()),
            StatusCode::BAD_GATEWAY,
        ),
        (
            AppError::Database("x".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
        (
            AppError::Internal(anyhow::anyhow!("x")),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, expected) in cases {
        let label = err.to_string();
        assert_eq!(err.into_response().status(), expected, "{label}");
    }
}

#[test]
fn test_invalid_month_message_names_format() {
    let err = AppError::InvalidMonthFormat("2025/01".to_string());
    assert!(err.to_string().contains("YYYY-MM"));
}
