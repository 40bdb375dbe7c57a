pub mod password;
pub mod token;

pub use password::*;
pub use token::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Stored password hash is malformed")]
    MalformedHash,

    #[error("Session token is invalid")]
    InvalidToken,

    #[error("Session token has expired")]
    TokenExpired,

    #[error("Token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}
