//! Credential plug-in seam.
//!
//! The dispatcher packs and unpacks the credential blob but never interprets
//! it; signing and verification belong to an [`AuthPlugin`].

use crate::error::CodecResult;

/// Opaque signed credential carried between the header and the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthCredential(Vec<u8>);

impl AuthCredential {
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Signs outgoing bodies and verifies incoming credentials.
pub trait AuthPlugin: Send + Sync {
    /// Produces the credential for `body`.
    fn sign(&self, body: &[u8]) -> CodecResult<AuthCredential>;

    /// Checks `credential` against `body`; fails with
    /// [`CodecError::AuthRejected`](crate::CodecError::AuthRejected) if it does not match.
    fn verify(&self, credential: &AuthCredential, body: &[u8]) -> CodecResult<()>;
}

/// Plug-in that signs with an empty credential and accepts anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthPlugin for NoAuth {
    fn sign(&self, _body: &[u8]) -> CodecResult<AuthCredential> {
        Ok(AuthCredential::default())
    }

    fn verify(&self, _credential: &AuthCredential, _body: &[u8]) -> CodecResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_auth_accepts_anything() {
        let credential = NoAuth.sign(b"body").unwrap();
        assert!(credential.as_bytes().is_empty());
        NoAuth
            .verify(&AuthCredential::new(vec![1, 2, 3]), b"other")
            .unwrap();
    }
}
