//! Email verification code extraction via IMAP polling.
//!
//! Polls the configured inbox for platform verification emails and pulls the
//! code out with platform-specific patterns. Reconnects per poll so a flaky
//! IMAP server cannot wedge the creation flow.

use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use roost_core::config::ImapSettings;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::storage::Platform;

const CODE_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Errors from the email verifier.
#[derive(Debug, thiserror::Error)]
pub enum EmailVerifyError {
    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No email patterns configured for platform {0}")]
    UnsupportedPlatform(String),
}

fn code_patterns(platform: Platform) -> Option<Vec<Regex>> {
    let raw: &[&str] = match platform {
        Platform::Tiktok => &[
            r"(?i)verification code[:\s]+(\d{4,6})",
            r"(?i)code is[:\s]+(\d{4,6})",
            r"(?i)\b(\d{6})\b.*verify",
        ],
        Platform::Instagram => &[
            r"(?i)confirmation code[:\s]+(\d{4,6})",
            r"(?i)security code[:\s]+(\d{4,6})",
            r"(?i)\b(\d{6})\b.*Instagram",
        ],
        _ => return None,
    };
    Some(raw.iter().filter_map(|p| Regex::new(p).ok()).collect())
}

fn platform_senders(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Tiktok => &["no-reply@tiktok.com", "verify@tiktok.com"],
        Platform::Instagram => &[
            "security@mail.instagram.com",
            "no-reply@mail.instagram.com",
        ],
        _ => &[],
    }
}

/// Poll the inbox for a platform verification code, up to the 120 s budget.
pub async fn poll_for_email_code(
    imap: &ImapSettings,
    platform: Platform,
) -> Result<Option<String>, EmailVerifyError> {
    let patterns = code_patterns(platform)
        .ok_or_else(|| EmailVerifyError::UnsupportedPlatform(platform.to_string()))?;
    let senders = platform_senders(platform);
    let deadline = tokio::time::Instant::now() + CODE_TIMEOUT;

    while tokio::time::Instant::now() < deadline {
        match scan_inbox(imap, senders, &patterns).await {
            Ok(Some(code)) => {
                info!(platform = %platform, "Email verification code found");
                return Ok(Some(code));
            }
            Ok(None) => debug!("No verification email yet"),
            Err(e) => warn!(error = %e, "IMAP poll error"),
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    warn!(platform = %platform, "Timed out waiting for verification email");
    Ok(None)
}

/// One connect-scan-disconnect pass over the inbox.
async fn scan_inbox(
    imap: &ImapSettings,
    senders: &[&str],
    patterns: &[Regex],
) -> Result<Option<String>, EmailVerifyError> {
    let tcp = TcpStream::connect((imap.host.as_str(), imap.port)).await?;
    let tls = async_native_tls::TlsConnector::new();
    let tls_stream = tls
        .connect(imap.host.as_str(), tcp)
        .await
        .map_err(|e| EmailVerifyError::Tls(e.to_string()))?;

    let client = async_imap::Client::new(tls_stream);
    let mut session = client
        .login(&imap.username, &imap.password)
        .await
        .map_err(|(e, _)| EmailVerifyError::Imap(e.to_string()))?;

    session
        .select("INBOX")
        .await
        .map_err(|e| EmailVerifyError::Imap(e.to_string()))?;

    let mut found = None;
    'senders: for sender in senders {
        let query = format!("UNSEEN FROM \"{sender}\"");
        let seqs = session
            .search(&query)
            .await
            .map_err(|e| EmailVerifyError::Imap(e.to_string()))?;
        if seqs.is_empty() {
            continue;
        }

        // Newest messages first, capped to keep the scan light
        let mut ordered: Vec<u32> = seqs.into_iter().collect();
        ordered.sort_unstable_by(|a, b| b.cmp(a));

        for seq in ordered.into_iter().take(5) {
            let body = {
                let mut fetches = session
                    .fetch(seq.to_string(), "BODY[TEXT]")
                    .await
                    .map_err(|e| EmailVerifyError::Imap(e.to_string()))?;
                let mut body = None;
                while let Some(item) = fetches.next().await {
                    let fetch = item.map_err(|e| EmailVerifyError::Imap(e.to_string()))?;
                    if let Some(text) = fetch.text() {
                        body = Some(String::from_utf8_lossy(text).into_owned());
                    }
                }
                body
            };

            if let Some(body) = body {
                for pattern in patterns {
                    if let Some(captures) = pattern.captures(&body) {
                        if let Some(code) = captures.get(1) {
                            found = Some(code.as_str().to_string());
                            break 'senders;
                        }
                    }
                }
            }
        }
    }

    session.logout().await.ok();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiktok_patterns_extract_codes() {
        let patterns = code_patterns(Platform::Tiktok).unwrap();
        let samples = [
            ("Your verification code: 482913", "482913"),
            ("your code is 55123", "55123"),
            ("Use 918273 to verify your account", "918273"),
        ];
        for (body, expected) in samples {
            let code = patterns
                .iter()
                .find_map(|p| p.captures(body).and_then(|c| c.get(1).map(|m| m.as_str())));
            assert_eq!(code, Some(expected), "body: {body}");
        }
    }

    #[test]
    fn instagram_patterns_extract_codes() {
        let patterns = code_patterns(Platform::Instagram).unwrap();
        let body = "Your Instagram security code: 031245";
        let code = patterns
            .iter()
            .find_map(|p| p.captures(body).and_then(|c| c.get(1).map(|m| m.as_str())));
        assert_eq!(code, Some("031245"));
    }

    #[test]
    fn unsupported_platform_has_no_patterns() {
        assert!(code_patterns(Platform::Reddit).is_none());
        assert!(platform_senders(Platform::Reddit).is_empty());
    }
}
