//! Identity gate for the private routes.
//!
//! Runs before any private handler: a request without a verifiable bearer
//! token never reaches the listing or signing code.

use crate::{errors::AppError, state::AppState};
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::warn;

/// Verify the `Authorization` header and attach the [`Principal`] to the
/// request extensions.
///
/// [`Principal`]: crate::services::auth_service::Principal
pub async fn require_principal(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let verdict = state.tokens.verify_header(
        request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok()),
    );

    match verdict {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            Ok(next.run(request).await)
        }
        Err(err) => {
            warn!(uri = %request.uri(), "rejected private request: {}", err);
            Err(err.into())
        }
    }
}
