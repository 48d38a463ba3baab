use chrono::Utc;

use crate::error::AuthError;
use crate::models::{Language, User};

// Mock credentials, compared in plaintext. There is no real auth protocol
// behind this; the token only exists to exercise the auth_token storage key.
const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_PASSWORD: &str = "password";

/// Checks the demo credentials and produces the session user plus an
/// opaque token. Errors are returned synchronously to the caller, never
/// parked in query state.
pub fn authenticate(email: &str, password: &str) -> Result<(User, String), AuthError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AuthError::MissingField("email"));
    }
    if password.is_empty() {
        return Err(AuthError::MissingField("password"));
    }
    if email != DEMO_EMAIL || password != DEMO_PASSWORD {
        return Err(AuthError::InvalidCredentials);
    }

    let user = User {
        id: "1".to_string(),
        name: "Demo User".to_string(),
        email: DEMO_EMAIL.to_string(),
        favorite_events: Vec::new(),
        language: Language::En,
    };
    let token = format!("demo-token-{}", Utc::now().timestamp());
    Ok((user, token))
}
