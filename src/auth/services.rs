use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::dto::{FieldError, UsernamePasswordInput};
use crate::mailer::Mailer;

pub const FORGET_PASSWORD_PREFIX: &str = "forget-password:";
/// Reset links stay valid for three days.
pub const FORGET_PASSWORD_TTL_SECS: u64 = 60 * 60 * 24 * 3;

const MIN_LEN: usize = 3;
const TOO_SHORT: &str = "length must be greater than 2";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn validate_password(field: &str, password: &str) -> Option<FieldError> {
    (password.chars().count() < MIN_LEN).then(|| FieldError::new(field, TOO_SHORT))
}

/// Field errors for a registration attempt, empty when the input is acceptable.
pub(crate) fn validate_register(options: &UsernamePasswordInput) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if !is_valid_email(&normalize_email(&options.email)) {
        errors.push(FieldError::new("email", "invalid email"));
    }
    if options.username.chars().count() < MIN_LEN {
        errors.push(FieldError::new("username", TOO_SHORT));
    }
    if options.username.contains('@') {
        errors.push(FieldError::new("username", "cannot include an @"));
    }
    errors.extend(validate_password("password", &options.password));
    errors
}

pub(crate) fn forget_password_key(token: &str) -> String {
    format!("{FORGET_PASSWORD_PREFIX}{token}")
}

pub(crate) async fn send_reset_email(
    mailer: &dyn Mailer,
    frontend_url: &str,
    to: &str,
    token: &str,
) -> anyhow::Result<()> {
    let link = format!(
        "{}/change-password/{}",
        frontend_url.trim_end_matches('/'),
        token
    );
    let html = format!(r#"<a href="{link}">reset password</a>"#);
    mailer.send(to, "Change password", &html).await
}
