//! Outbound delivery of one-time codes.

use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;

use crate::config::{SmtpConfig, APP_NAME};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Email delivery is not configured")]
    NotConfigured,

    #[error("Invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Could not build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Sends a one-time code to an address. Callers treat failure as non-fatal.
pub trait EmailDispatcher: Send + Sync {
    fn send_code(&self, address: &str, code: &str) -> Result<(), NotifyError>;
}

/// Used when no SMTP server is configured: every send fails, so callers
/// fall through to their diagnostic logging.
#[derive(Debug, Default)]
pub struct DisabledDispatcher;

impl EmailDispatcher for DisabledDispatcher {
    fn send_code(&self, _address: &str, _code: &str) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured)
    }
}

pub struct SmtpDispatcher {
    transport: SmtpTransport,
    from: Mailbox,
    code_lifetime: String,
}

impl SmtpDispatcher {
    /// `code_ttl_secs` is the validity window stated in the email body.
    pub fn new(config: &SmtpConfig, code_ttl_secs: i64) -> Result<Self, NotifyError> {
        let sender = config.from.as_deref().unwrap_or(&config.username);
        let from = Mailbox::new(Some(APP_NAME.to_string()), sender.parse()?);

        let mut builder = SmtpTransport::starttls_relay(&config.host)?.port(config.port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            code_lifetime: describe_lifetime(code_ttl_secs),
        })
    }
}

impl EmailDispatcher for SmtpDispatcher {
    fn send_code(&self, address: &str, code: &str) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(address.parse()?)
            .subject(format!("{APP_NAME} - Verification Code"))
            .multipart(MultiPart::alternative_plain_html(
                render_plain(code, &self.code_lifetime),
                render_html(code, &self.code_lifetime),
            ))?;

        self.transport.send(&message)?;
        Ok(())
    }
}

/// Human wording for a code lifetime: "10 minutes", "1 hour", "90 seconds".
fn describe_lifetime(secs: i64) -> String {
    let secs = secs.max(0);
    let (n, unit) = if secs >= 3600 && secs % 3600 == 0 {
        (secs / 3600, "hour")
    } else if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

fn render_plain(code: &str, lifetime: &str) -> String {
    format!(
        "Your {APP_NAME} verification code is {code}.\n\
         This code will expire in {lifetime}.\n\
         If you didn't request this code, please ignore this email."
    )
}

fn render_html(code: &str, lifetime: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;">
  <h2 style="color: #333;">Verification Code</h2>
  <p style="color: #666;">Your verification code is:</p>
  <p style="font-size: 32px; font-weight: bold; letter-spacing: 8px; color: #667eea;">{code}</p>
  <p style="color: #666;">This code will expire in {lifetime}.</p>
  <p style="color: #999; font-size: 12px;">If you didn't request this code, please ignore this email.</p>
</div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_dispatcher_always_fails() {
        let result = DisabledDispatcher.send_code("a@example.com", "123456");
        assert!(matches!(result, Err(NotifyError::NotConfigured)));
    }

    #[test]
    fn bodies_carry_the_code_and_lifetime() {
        let lifetime = describe_lifetime(600);
        assert!(render_plain("482913", &lifetime).contains("482913"));
        assert!(render_html("482913", &lifetime).contains(">482913<"));
        assert!(render_plain("482913", &lifetime).contains("expire in 10 minutes."));
        assert!(render_html("482913", &describe_lifetime(90)).contains("expire in 90 seconds."));
    }

    #[test]
    fn lifetime_wording_follows_configuration() {
        assert_eq!(describe_lifetime(600), "10 minutes");
        assert_eq!(describe_lifetime(60), "1 minute");
        assert_eq!(describe_lifetime(3600), "1 hour");
        assert_eq!(describe_lifetime(7200), "2 hours");
        assert_eq!(describe_lifetime(5400), "90 minutes");
        assert_eq!(describe_lifetime(1), "1 second");
        assert_eq!(describe_lifetime(0), "0 seconds");
    }

    #[test]
    fn smtp_dispatcher_rejects_bad_sender() {
        let config = SmtpConfig {
            host: "localhost".into(),
            port: 2525,
            username: "not an address".into(),
            password: String::new(),
            from: None,
        };
        assert!(matches!(SmtpDispatcher::new(&config, 600), Err(NotifyError::Address(_))));
    }

    #[test]
    fn smtp_dispatcher_builds_with_valid_sender() {
        let config = SmtpConfig {
            host: "localhost".into(),
            port: 2525,
            username: String::new(),
            password: String::new(),
            from: Some("vault@example.com".into()),
        };
        let dispatcher = SmtpDispatcher::new(&config, 300).unwrap();
        assert_eq!(dispatcher.code_lifetime, "5 minutes");
    }
}
