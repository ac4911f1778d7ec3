use base64::{Engine as _, engine::general_purpose};
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

/// The size of a creator token in bytes.
const CREATOR_TOKEN_SIZE: usize = 32;

/// Generates a new random creator token.
///
/// # Returns
///
/// A URL-safe base64-encoded token.
pub fn generate_creator_token() -> String {
    let mut token = [0u8; CREATOR_TOKEN_SIZE];
    OsRng.fill_bytes(&mut token);

    general_purpose::URL_SAFE_NO_PAD.encode(token)
}

/// Compares a presented creator token with the stored one in constant time.
pub fn creator_token_matches(presented: &str, stored: &str) -> bool {
    presented.as_bytes().ct_eq(stored.as_bytes()).into()
}
