//! Encoding of the OAuth `state` parameter.
//!
//! Every state carries fresh random entropy plus the identity it was issued
//! for, so the callback can find the stored copy without a side lookup.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Identity recovered from a state value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateIdentity {
    pub user_id: String,
    pub org_id: String,
}

/// Wire format of the state parameter, chosen per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCodec {
    /// `{provider}:{nonce}:{user_id}:{org_id}` with percent-encoded ids.
    Delimited,
    /// URL-safe base64 of `{"state": nonce, "user_id": .., "org_id": ..}`.
    EncodedJson,
}

#[derive(Serialize, Deserialize)]
struct StatePayload {
    state: String,
    user_id: String,
    org_id: String,
}

impl StateCodec {
    pub fn encode(self, provider: &str, nonce: &str, user_id: &str, org_id: &str) -> String {
        match self {
            StateCodec::Delimited => format!(
                "{provider}:{nonce}:{}:{}",
                urlencoding::encode(user_id),
                urlencoding::encode(org_id)
            ),
            StateCodec::EncodedJson => {
                let payload = StatePayload {
                    state: nonce.to_string(),
                    user_id: user_id.to_string(),
                    org_id: org_id.to_string(),
                };
                // serializing three strings cannot fail
                let json = serde_json::to_vec(&payload).unwrap_or_default();
                base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
            }
        }
    }

    pub fn decode(self, provider: &str, state: &str) -> Result<StateIdentity, AuthError> {
        match self {
            StateCodec::Delimited => {
                let mut parts = state.splitn(4, ':');
                let (Some(prefix), Some(nonce), Some(user), Some(org)) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Err(AuthError::InvalidState);
                };
                if prefix != provider || nonce.is_empty() {
                    return Err(AuthError::InvalidState);
                }
                let user_id = urlencoding::decode(user).map_err(|_| AuthError::InvalidState)?;
                let org_id = urlencoding::decode(org).map_err(|_| AuthError::InvalidState)?;
                Ok(StateIdentity {
                    user_id: user_id.into_owned(),
                    org_id: org_id.into_owned(),
                })
            }
            StateCodec::EncodedJson => {
                // accept padded input too
                let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
                    .decode(state.trim_end_matches('='))
                    .map_err(|_| AuthError::InvalidState)?;
                let payload: StatePayload =
                    serde_json::from_slice(&bytes).map_err(|_| AuthError::InvalidState)?;
                if payload.state.is_empty() {
                    return Err(AuthError::InvalidState);
                }
                Ok(StateIdentity {
                    user_id: payload.user_id,
                    org_id: payload.org_id,
                })
            }
        }
    }
}
