//! Request authentication.

use std::fmt::Debug;

use sha2::{Digest, Sha512};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, Error)]
pub enum AuthError {
    #[error("the request was not authenticated")]
    Unauthenticated,
}

pub trait Authorizer: Debug + Send + Sync + 'static {
    /// Check the bearer token supplied with a request, if any.
    fn authorize(&self, token: Option<&str>) -> Result<(), AuthError>;
}

/// An [`Authorizer`] that grants access to all requests carrying the one
/// shared-secret token. Only a digest of the token is retained.
#[derive(Debug)]
pub struct AllOrNothingAuthorizer {
    token_digest: Vec<u8>,
}

impl AllOrNothingAuthorizer {
    pub fn new(token: &str) -> Self {
        Self {
            token_digest: Sha512::digest(token.as_bytes()).to_vec(),
        }
    }
}

impl Authorizer for AllOrNothingAuthorizer {
    fn authorize(&self, token: Option<&str>) -> Result<(), AuthError> {
        let provided = token.ok_or(AuthError::Unauthenticated)?;
        if Sha512::digest(provided.as_bytes())[..] == self.token_digest {
            Ok(())
        } else {
            warn!("invalid token provided");
            Err(AuthError::Unauthenticated)
        }
    }
}

/// The [`Authorizer`] used when the server is started without auth.
#[derive(Debug, Clone, Copy)]
pub struct NoAuthAuthorizer;

impl Authorizer for NoAuthAuthorizer {
    fn authorize(&self, _token: Option<&str>) -> Result<(), AuthError> {
        Ok(())
    }
}
