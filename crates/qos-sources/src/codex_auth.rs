//! Signed-in Codex identity, read from the `id_token` JWT in `auth.json`.

use base64::{Engine as _, engine::general_purpose};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct CodexAuthFile {
    #[serde(default)]
    tokens: Option<CodexTokens>,
}

#[derive(Debug, Default, Deserialize)]
struct CodexTokens {
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    #[serde(default)]
    email: Option<String>,
}

/// Claims segment of a JWT, decoded. Accepts both base64 alphabets, with or
/// without padding. The signature is not checked.
fn decode_claims(jwt: &str) -> Option<Vec<u8>> {
    let segment = jwt.split('.').nth(1)?;
    let normalized: String = segment
        .trim_end_matches('=')
        .chars()
        .map(|c| match c {
            '+' => '-',
            '/' => '_',
            other => other,
        })
        .collect();
    general_purpose::URL_SAFE_NO_PAD.decode(normalized).ok()
}

/// `email` claim of the Codex `id_token`; `None` when the file, the token or
/// the claim is missing or malformed.
pub fn read_codex_email(auth_path: &Path) -> Option<String> {
    let content = fs::read_to_string(auth_path).ok()?;
    let auth: CodexAuthFile = serde_json::from_str(&content).ok()?;
    let id_token = auth.tokens?.id_token?;
    let claims: IdTokenClaims = match decode_claims(&id_token)
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
    {
        Some(claims) => claims,
        None => {
            tracing::debug!(path = %auth_path.display(), "Undecodable Codex id_token");
            return None;
        }
    };
    claims.email.filter(|email| !email.is_empty())
}
