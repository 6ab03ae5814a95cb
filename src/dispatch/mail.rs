//! Bulk mail loop — SMTP via lettre.
//!
//! Distinct channel from the messaging dispatch: sequential but
//! unthrottled (no platform rate-limit concern) and without an existence
//! pre-check, since email deliverability cannot be cheaply verified
//! synchronously.

use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::MailError;

/// SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl MailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `SMTP_HOST` is not set (mail disabled).
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;

        let smtp_port: u16 = std::env::var("SMTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("SMTP_PASSWORD").unwrap_or_default());
        let from_address = std::env::var("SMTP_FROM").unwrap_or_else(|_| username.clone());

        Some(Self {
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

/// Aggregate outcome of one mail run, with per-address error strings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MailReport {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

/// Sequential bulk mail engine.
pub struct BulkMailEngine {
    config: MailConfig,
}

impl BulkMailEngine {
    pub fn new(config: MailConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, MailError> {
        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );
        Ok(SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| MailError::Build(format!("SMTP relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build())
    }

    fn build_message(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> Result<Message, MailError> {
        let builder = Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| MailError::InvalidAddress {
                        address: self.config.from_address.clone(),
                        reason: format!("{e}"),
                    })?,
            )
            .to(to.parse().map_err(|e| MailError::InvalidAddress {
                address: to.to_string(),
                reason: format!("{e}"),
            })?)
            .subject(subject);

        match html {
            Some(html) => builder
                .multipart(MultiPart::alternative_plain_html(
                    text.to_string(),
                    html.to_string(),
                ))
                .map_err(|e| MailError::Build(e.to_string())),
            None => builder
                .body(text.to_string())
                .map_err(|e| MailError::Build(e.to_string())),
        }
    }

    /// Send one message to every address, independently. An error on one
    /// address is recorded as `"<address>: <error>"` and never aborts the
    /// remaining addresses. Blocking; run under `spawn_blocking` from
    /// async contexts.
    pub fn dispatch_mail(
        &self,
        addresses: &[String],
        subject: &str,
        text: &str,
        html: Option<&str>,
    ) -> MailReport {
        let mut report = MailReport::default();

        let transport = match self.transport() {
            Ok(t) => t,
            Err(e) => {
                // Transport construction failing fails every address the
                // same way; still one error entry per address so the report
                // shape stays uniform.
                for address in addresses {
                    report.failed += 1;
                    report.errors.push(format!("{address}: {e}"));
                }
                return report;
            }
        };

        tracing::info!(addresses = addresses.len(), "Bulk mail started");

        for address in addresses {
            let outcome = self
                .build_message(address, subject, text, html)
                .and_then(|message| {
                    transport.send(&message).map(|_| ()).map_err(|e| {
                        MailError::Send {
                            address: address.clone(),
                            reason: e.to_string(),
                        }
                    })
                });

            match outcome {
                Ok(()) => {
                    report.success += 1;
                    tracing::info!(address = %address, "Mail sent");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(address = %address, error = %e, "Mail failed");
                    report.errors.push(format!("{address}: {e}"));
                }
            }
        }

        tracing::info!(
            success = report.success,
            failed = report.failed,
            "Bulk mail finished"
        );
        report
    }

    /// Connectivity self-test against the SMTP server, without sending.
    /// Blocking; run under `spawn_blocking` from async contexts.
    pub fn verify(&self) -> Result<(), MailError> {
        let transport = self.transport()?;
        match transport.test_connection() {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailError::Verify("server rejected the connection".into())),
            Err(e) => Err(MailError::Verify(e.to_string())),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> MailConfig {
        MailConfig {
            smtp_host: "smtp.test.com".into(),
            smtp_port: 587,
            username: "user".into(),
            password: SecretString::from("pass".to_string()),
            from_address: "bot@test.com".into(),
        }
    }

    #[test]
    fn build_plain_message() {
        let engine = BulkMailEngine::new(test_config());
        let msg = engine.build_message("alice@example.com", "Aviso", "hola", None);
        assert!(msg.is_ok());
    }

    #[test]
    fn build_html_message() {
        let engine = BulkMailEngine::new(test_config());
        let msg = engine.build_message(
            "alice@example.com",
            "Aviso",
            "hola",
            Some("<p>hola</p>"),
        );
        assert!(msg.is_ok());
    }

    #[test]
    fn invalid_recipient_address_is_rejected() {
        let engine = BulkMailEngine::new(test_config());
        let err = engine
            .build_message("not-an-address", "Aviso", "hola", None)
            .unwrap_err();
        assert!(matches!(err, MailError::InvalidAddress { .. }));
    }

    #[test]
    fn invalid_address_counts_as_failed_without_aborting() {
        // "not-an-address" fails at message build, before any network IO,
        // so this exercises the per-address isolation offline. A valid
        // address after it would hit the network, so keep the batch to
        // build-level failures only.
        let engine = BulkMailEngine::new(test_config());
        let report = engine.dispatch_mail(
            &["not-an-address".to_string(), "also bad".to_string()],
            "Aviso",
            "hola",
            None,
        );

        assert_eq!(report.success, 0);
        assert_eq!(report.failed, 2);
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("not-an-address: "));
        assert!(report.errors[1].starts_with("also bad: "));
    }

    #[test]
    fn empty_address_list_yields_empty_report() {
        let engine = BulkMailEngine::new(test_config());
        let report = engine.dispatch_mail(&[], "Aviso", "hola", None);
        assert_eq!(report.success, 0);
        assert_eq!(report.failed, 0);
        assert!(report.errors.is_empty());
    }
}
