pub mod identity;
pub mod profile;
pub mod signup_token;

pub use identity::Identity;
pub use profile::Profile;
pub use signup_token::SignupToken;

/// Canonical form for email keys: trimmed and lowercased.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
