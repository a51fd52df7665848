use base64::Engine as _;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Characters allowed in a PKCE code verifier (RFC 7636 §4.1, unreserved set).
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

const VERIFIER_LEN: usize = 64;

/// Random URL-safe token built from `n_bytes` bytes of entropy.
pub fn random_token(n_bytes: usize) -> String {
    let mut bytes = vec![0u8; n_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes)
}

/// PKCE verifier/challenge pair using the S256 method.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let verifier: String = (0..VERIFIER_LEN)
            .map(|_| {
                let idx = (rng.next_u32() as usize) % VERIFIER_CHARSET.len();
                VERIFIER_CHARSET[idx] as char
            })
            .collect();
        let challenge = challenge_for(&verifier);
        Self { verifier, challenge }
    }
}

/// `BASE64URL(SHA256(verifier))` without padding.
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}
