use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::{errors::AppError, AppState};

/// Guards the MCP endpoint when `MCP_API_TOKEN` is set. Without a token the endpoint is open.
pub async fn require_bearer_token(
    State(state): State<AppState>,
    auth_header: Option<TypedHeader<Authorization<Bearer>>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.api_token.as_deref() {
        let Some(TypedHeader(auth)) = auth_header else {
            return Err(AppError::unauthorized(
                "missing_token",
                "missing authorization header",
            ));
        };
        if !token_matches(auth.token(), expected) {
            return Err(AppError::unauthorized(
                "invalid_token",
                "invalid bearer token",
            ));
        }
    }

    Ok(next.run(request).await)
}

/// Compares without short-circuiting on the first differing byte.
fn token_matches(presented: &str, expected: &str) -> bool {
    let (presented, expected) = (presented.as_bytes(), expected.as_bytes());
    presented.len() == expected.len()
        && presented
            .iter()
            .zip(expected)
            .fold(0u8, |diff, (a, b)| diff | (a ^ b))
            == 0
}
