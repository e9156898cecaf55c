use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Authorization failures, resolved into a response within the request that
/// caused them.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No usable token and the client cannot follow a login redirect.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Callback arrived without a login in progress.
    #[error("missing state")]
    MissingState,

    /// Callback state does not match the one issued at login.
    #[error("incorrect state")]
    StateMismatch,

    /// The IdP reported an error instead of issuing a code.
    #[error("authorization denied: {0}")]
    Denied(String),

    #[error("missing authorization code")]
    MissingCode,

    /// Token does not carry every required scope.
    #[error("insufficient permissions")]
    ScopeInsufficient,

    /// Code exchange with the token endpoint failed.
    #[error("error exchanging token")]
    Exchange,
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired | Self::ScopeInsufficient => StatusCode::UNAUTHORIZED,
            Self::MissingState | Self::StateMismatch | Self::Denied(_) => StatusCode::FORBIDDEN,
            Self::MissingCode => StatusCode::BAD_REQUEST,
            Self::Exchange => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "authentication_required",
            Self::MissingState => "missing_state",
            Self::StateMismatch => "state_mismatch",
            Self::Denied(_) => "denied",
            Self::MissingCode => "missing_code",
            Self::ScopeInsufficient => "scope_insufficient",
            Self::Exchange => "exchange_failed",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = match &self {
            // The IdP's error code is echoed to logs, not to the client.
            Self::Denied(_) => "authorization denied".to_string(),
            other => other.to_string(),
        };
        (self.status(), body).into_response()
    }
}
