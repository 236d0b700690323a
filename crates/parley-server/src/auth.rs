//! Credential check consulted before an `identify` is honored.
//!
//! Account management lives outside the relay. All the relay needs is a yes
//! or no for "may this connection speak as this participant".

use std::collections::HashMap;

use async_trait::async_trait;
use parley_core::ParticipantId;

/// Decides whether a connection may claim an identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// `true` if `identity` presenting `token` is authenticated.
    async fn verify(&self, identity: &ParticipantId, token: Option<&str>) -> bool;
}

/// Accepts every identity. For deployments where authentication happened
/// upstream.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

#[async_trait]
impl IdentityVerifier for AllowAll {
    async fn verify(&self, _identity: &ParticipantId, _token: Option<&str>) -> bool {
        true
    }
}

/// One configured token per participant.
///
/// Unknown identities and wrong or missing tokens are refused.
#[derive(Clone, Debug, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, String>,
}

impl StaticTokens {
    /// Build from `identity → token` pairs.
    pub fn new<I, K, V>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl IdentityVerifier for StaticTokens {
    async fn verify(&self, identity: &ParticipantId, token: Option<&str>) -> bool {
        match (self.tokens.get(identity.as_str()), token) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        }
    }
}
