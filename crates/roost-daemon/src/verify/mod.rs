//! External verification providers for account creation.
//!
//! CAPTCHA solving, disposable SMS numbers, and email verification codes.
//! All three are optional at runtime: when any is missing, the creation
//! runner skips its work with a warning event instead of failing.

mod captcha;
mod email;
mod sms;

pub use captcha::CaptchaClient;
pub use email::{poll_for_email_code, EmailVerifyError};
pub use sms::{SmsClient, SmsVerification};

/// Errors from verification providers.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),
}
