use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token issuer/audience did not match configuration")]
    InvalidIssuerOrAudience,

    #[error("no identity attached to request")]
    Unauthenticated,

    #[error("JWT_SECRET is not configured and OMS_DEV_MODE is not set")]
    MissingSecret,
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidIssuer | ErrorKind::InvalidAudience => Self::InvalidIssuerOrAudience,
            _ => Self::InvalidToken(err.to_string()),
        }
    }
}
