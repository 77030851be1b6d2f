//! Contact form relay.
//!
//! Submissions are rate limited, validated (every violation is reported at
//! once), sanitized and then handed to the operator mail transport.
//!
//! Email delivery is best-effort on purpose. Once a submission is accepted the
//! submitter always gets a success receipt; a failed delivery is logged and
//! reported through [`DeliveryOutcome`] but never turned into an error
//! response. Do not tighten this: a false "failed" message makes people
//! resubmit or give up, which costs more than a missed email that monitoring
//! will catch.

use crate::config::Config;
use crate::mailer::{Mailer, Notification};
use crate::rate_limit::SlidingWindowLimiter;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{error, info, warn};

pub const MAX_FIELD_LENGTH: usize = 5000;

const MIN_NAME_LENGTH: usize = 2;
const MIN_MESSAGE_LENGTH: usize = 10;

const DEFAULT_PHONE: &str = "Not provided";
const DEFAULT_SERVICE: &str = "General Inquiry";
const DEFAULT_LANGUAGE: &str = "en";

const FALLBACK_SENDER: &str = "noreply@blglegalservices.com";

pub const ACK_MESSAGE: &str =
    "Thank you for contacting us. We will get back to you within 24-48 hours.";

/// Raw form fields exactly as the browser sent them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactSubmission {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// A submission that passed validation, with every field sanitized.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub service: String,
    pub message: String,
    pub language: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    Failed(String),
    NotConfigured,
}

/// What the submitter gets back, plus the internal delivery outcome.
#[derive(Debug, Clone)]
pub struct ContactReceipt {
    pub reference: String,
    pub message: &'static str,
    pub delivery: DeliveryOutcome,
}

#[derive(Debug, Error, PartialEq)]
pub enum ContactError {
    #[error("Too many contact form submissions, please try again later.")]
    RateLimited,

    #[error("Validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid"))
}

/// Strip angle brackets, trim, and cap at [`MAX_FIELD_LENGTH`] characters.
pub fn sanitize(input: &str) -> String {
    let stripped: String = input.chars().filter(|c| *c != '<' && *c != '>').collect();
    stripped.trim().chars().take(MAX_FIELD_LENGTH).collect()
}

fn sanitize_or(value: Option<&str>, default: &str) -> String {
    let cleaned = value.map(sanitize).unwrap_or_default();
    if cleaned.is_empty() {
        default.to_string()
    } else {
        cleaned
    }
}

impl ContactSubmission {
    /// Check every field and collect all violations.
    ///
    /// Lengths are measured on the sanitized value, so markup-only input such
    /// as `"<>"` cannot satisfy a minimum length and come out empty.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        let name = self.name.as_deref().map(sanitize).unwrap_or_default();
        if name.chars().count() < MIN_NAME_LENGTH {
            errors.push("Name is required (minimum 2 characters)".to_string());
        }

        let email = self.email.as_deref().map(sanitize).unwrap_or_default();
        if !email_regex().is_match(&email) {
            errors.push("Valid email is required".to_string());
        }

        let message = self.message.as_deref().map(sanitize).unwrap_or_default();
        if message.chars().count() < MIN_MESSAGE_LENGTH {
            errors.push("Message is required (minimum 10 characters)".to_string());
        }

        errors
    }

    /// Validate and sanitize in one step.
    pub fn into_sanitized(self, now: DateTime<Utc>) -> Result<SanitizedSubmission, ContactError> {
        let errors = self.validate();
        if !errors.is_empty() {
            return Err(ContactError::Invalid(errors));
        }

        Ok(SanitizedSubmission {
            name: sanitize(self.name.as_deref().unwrap_or_default()),
            email: sanitize(self.email.as_deref().unwrap_or_default()),
            phone: sanitize_or(self.phone.as_deref(), DEFAULT_PHONE),
            service: sanitize_or(self.service.as_deref(), DEFAULT_SERVICE),
            message: sanitize(self.message.as_deref().unwrap_or_default()),
            language: sanitize_or(self.language.as_deref(), DEFAULT_LANGUAGE),
            submitted_at: now,
        })
    }
}

/// Human-facing label for a service key from the form's select box.
pub fn service_label(service: &str) -> &str {
    match service {
        "immigration" => "Immigration Services",
        "trademark" => "Trademark Registration",
        "business" => "Business Formation",
        "consultation" => "Consultation Request",
        "general" => "General Inquiry",
        other => other,
    }
}

/// `BLG-` followed by the epoch milliseconds in upper-case base 36.
pub fn reference_token(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().max(0) as u64;
    format!("BLG-{}", to_base36(millis))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Compose the operator notification for an accepted submission.
pub fn compose_notification(
    submission: &SanitizedSubmission,
    sender: &str,
    recipients: &[String],
) -> Notification {
    let submitted = submission.submitted_at.format("%Y-%m-%d %H:%M:%S UTC");

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <style>
    body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
    .container {{ max-width: 600px; margin: 0 auto; padding: 20px; }}
    .header {{ background: #1a365d; color: white; padding: 20px; text-align: center; }}
    .content {{ padding: 20px; background: #f9f9f9; }}
    .field {{ margin-bottom: 15px; }}
    .label {{ font-weight: bold; color: #1a365d; }}
    .value {{ margin-top: 5px; }}
    .footer {{ padding: 20px; text-align: center; font-size: 12px; color: #666; }}
    .highlight {{ background: #fff3cd; padding: 10px; border-left: 4px solid #ffc107; margin: 15px 0; }}
  </style>
</head>
<body>
  <div class="container">
    <div class="header"><h1>New Contact Form Submission</h1></div>
    <div class="content">
      <div class="highlight"><strong>Service Type:</strong> {service}</div>
      <div class="field"><div class="label">Name:</div><div class="value">{name}</div></div>
      <div class="field"><div class="label">Email:</div><div class="value"><a href="mailto:{email}">{email}</a></div></div>
      <div class="field"><div class="label">Phone:</div><div class="value">{phone}</div></div>
      <div class="field"><div class="label">Message:</div><div class="value" style="white-space: pre-wrap;">{message}</div></div>
      <div class="field"><div class="label">Language Preference:</div><div class="value">{language}</div></div>
    </div>
    <div class="footer">
      <p>Submitted at: {submitted}</p>
      <p>BLG Legal Services - Website Contact Form</p>
    </div>
  </div>
</body>
</html>"#,
        service = service_label(&submission.service),
        name = submission.name,
        email = submission.email,
        phone = submission.phone,
        message = submission.message,
        language = submission.language.to_uppercase(),
        submitted = submitted,
    );

    let text = format!(
        "New Contact Form Submission\n\
         ============================\n\n\
         Service: {}\n\
         Name: {}\n\
         Email: {}\n\
         Phone: {}\n\
         Language: {}\n\n\
         Message:\n{}\n\n\
         Submitted at: {}",
        submission.service,
        submission.name,
        submission.email,
        submission.phone,
        submission.language,
        submission.message,
        submission.submitted_at.to_rfc3339(),
    );

    Notification {
        from: format!("\"BLG Website\" <{}>", sender),
        to: recipients.to_vec(),
        reply_to: submission.email.clone(),
        subject: format!(
            "[Website] New {} inquiry from {}",
            submission.service, submission.name
        ),
        html,
        text,
    }
}

pub struct ContactRelay {
    config: Arc<Config>,
    mailer: Option<Arc<dyn Mailer>>,
    limiter: SlidingWindowLimiter,
}

impl ContactRelay {
    pub fn new(config: Arc<Config>, mailer: Option<Arc<dyn Mailer>>) -> Self {
        Self::with_limiter(config, mailer, SlidingWindowLimiter::contact_form())
    }

    pub fn with_limiter(
        config: Arc<Config>,
        mailer: Option<Arc<dyn Mailer>>,
        limiter: SlidingWindowLimiter,
    ) -> Self {
        Self {
            config,
            mailer,
            limiter,
        }
    }

    pub fn is_mail_configured(&self) -> bool {
        self.mailer.is_some()
    }

    pub fn limiter(&self) -> &SlidingWindowLimiter {
        &self.limiter
    }

    /// Accept a submission from `client` (its source address).
    ///
    /// Rate-limited and invalid submissions are rejected before anything is
    /// sent. An accepted submission always yields a receipt, whatever the
    /// notification outcome.
    pub async fn submit(
        &self,
        client: &str,
        submission: ContactSubmission,
    ) -> Result<ContactReceipt, ContactError> {
        if !self.limiter.check(client) {
            warn!("Contact form rate limit exceeded for {}", client);
            return Err(ContactError::RateLimited);
        }

        let now = Utc::now();
        let sanitized = submission.into_sanitized(now)?;

        info!(
            name = %sanitized.name,
            email = %sanitized.email,
            service = %sanitized.service,
            client = %client,
            "New contact form submission at {}",
            sanitized.submitted_at.to_rfc3339()
        );

        let delivery = self.notify(&sanitized).await;

        Ok(ContactReceipt {
            reference: reference_token(now),
            message: ACK_MESSAGE,
            delivery,
        })
    }

    /// Send the operator notification. Failures are logged and returned,
    /// never raised.
    ///
    /// The send runs on its own task so it completes even if the submitter
    /// disconnects and this request's future is dropped.
    async fn notify(&self, submission: &SanitizedSubmission) -> DeliveryOutcome {
        let Some(mailer) = &self.mailer else {
            warn!("Email not configured - submission logged but not emailed");
            return DeliveryOutcome::NotConfigured;
        };

        let sender = self.config.email_user.as_deref().unwrap_or(FALLBACK_SENDER);
        let notification = compose_notification(submission, sender, &self.config.email_to);

        let mailer = Arc::clone(mailer);
        let delivery = tokio::spawn(async move { mailer.send(&notification).await });

        match delivery.await {
            Ok(Ok(())) => {
                info!("✓ Email notification sent");
                DeliveryOutcome::Sent
            }
            Ok(Err(e)) => {
                error!("Failed to send email notification: {:#}", e);
                DeliveryOutcome::Failed(format!("{:#}", e))
            }
            Err(e) => {
                error!("Email notification task failed: {}", e);
                DeliveryOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(())
        }
    }

    fn valid_submission() -> ContactSubmission {
        ContactSubmission {
            name: Some("Jane Doe".to_string()),
            email: Some("jane@example.com".to_string()),
            message: Some("I need help with my visa application.".to_string()),
            ..Default::default()
        }
    }

    fn relay_with(mailer: Option<Arc<RecordingMailer>>) -> ContactRelay {
        let config = Config {
            email_user: Some("site@example.com".to_string()),
            email_to: vec!["law@example.com".to_string()],
            ..Config::default()
        };
        ContactRelay::new(
            Arc::new(config),
            mailer.map(|m| m as Arc<dyn Mailer>),
        )
    }

    // ==================== Sanitization Tests ====================

    #[test]
    fn test_sanitize_strips_angle_brackets_and_trims() {
        assert_eq!(sanitize("  <script>alert(1)</script>  "), "scriptalert(1)/script");
    }

    #[test]
    fn test_sanitize_truncates_by_characters() {
        let long = "é".repeat(MAX_FIELD_LENGTH + 100);
        let cleaned = sanitize(&long);
        assert_eq!(cleaned.chars().count(), MAX_FIELD_LENGTH);
    }

    proptest! {
        #[test]
        fn prop_sanitize_output_is_bounded_and_bracket_free(input in ".{0,6000}") {
            let cleaned = sanitize(&input);
            prop_assert!(cleaned.chars().count() <= MAX_FIELD_LENGTH);
            prop_assert!(!cleaned.contains('<'));
            prop_assert!(!cleaned.contains('>'));
        }

        #[test]
        fn prop_valid_submissions_sanitize_to_non_empty_bounded_fields(
            name in "[<> ]{0,3}[A-Za-z][A-Za-z <>]{1,40}",
            message in "[A-Za-z<> .,]{0,7000}",
        ) {
            let submission = ContactSubmission {
                name: Some(name),
                email: Some("client@example.com".to_string()),
                message: Some(message),
                ..Default::default()
            };

            if submission.validate().is_empty() {
                let clean = submission.into_sanitized(Utc::now()).unwrap();
                for field in [&clean.name, &clean.email, &clean.phone, &clean.service, &clean.message, &clean.language] {
                    prop_assert!(!field.is_empty());
                    prop_assert!(field.chars().count() <= MAX_FIELD_LENGTH);
                }
            }
        }
    }

    // ==================== Validation Tests ====================

    #[test]
    fn test_validate_accepts_minimal_submission() {
        assert!(valid_submission().validate().is_empty());
    }

    #[test]
    fn test_validate_reports_short_name() {
        let submission = ContactSubmission {
            name: Some("A".to_string()),
            ..valid_submission()
        };
        let errors = submission.validate();
        assert_eq!(errors, vec!["Name is required (minimum 2 characters)"]);
    }

    #[test]
    fn test_validate_accumulates_every_violation() {
        let errors = ContactSubmission::default().validate();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("Name"));
        assert!(errors[1].contains("email"));
        assert!(errors[2].contains("Message"));
    }

    #[test]
    fn test_validate_email_pattern() {
        for bad in ["jane", "jane@example", "jane @example.com", "@example.com", "jane@.com@x"] {
            let submission = ContactSubmission {
                email: Some(bad.to_string()),
                ..valid_submission()
            };
            assert_eq!(
                submission.validate(),
                vec!["Valid email is required"],
                "should reject {}",
                bad
            );
        }
    }

    #[test]
    fn test_validate_measures_sanitized_length() {
        let submission = ContactSubmission {
            name: Some("<<>>".to_string()),
            message: Some("   <short>   ".to_string()),
            ..valid_submission()
        };
        assert_eq!(submission.validate().len(), 2);
    }

    #[test]
    fn test_into_sanitized_applies_defaults() {
        let clean = valid_submission().into_sanitized(Utc::now()).unwrap();
        assert_eq!(clean.phone, "Not provided");
        assert_eq!(clean.service, "General Inquiry");
        assert_eq!(clean.language, "en");
    }

    #[test]
    fn test_into_sanitized_keeps_provided_optionals() {
        let submission = ContactSubmission {
            phone: Some(" +1 555 0100 ".to_string()),
            service: Some("immigration".to_string()),
            language: Some("ru".to_string()),
            ..valid_submission()
        };
        let clean = submission.into_sanitized(Utc::now()).unwrap();
        assert_eq!(clean.phone, "+1 555 0100");
        assert_eq!(clean.service, "immigration");
        assert_eq!(clean.language, "ru");
    }

    // ==================== Reference Token Tests ====================

    #[test]
    fn test_to_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(1_700_000_000_000), "LOYW3V28");
    }

    #[test]
    fn test_reference_token_format() {
        let reference = reference_token(Utc::now());
        let pattern = Regex::new(r"^BLG-[0-9A-Z]+$").unwrap();
        assert!(pattern.is_match(&reference), "bad reference: {}", reference);
    }

    // ==================== Notification Tests ====================

    #[test]
    fn test_compose_notification() {
        let clean = ContactSubmission {
            service: Some("trademark".to_string()),
            language: Some("es".to_string()),
            ..valid_submission()
        }
        .into_sanitized(Utc::now())
        .unwrap();

        let recipients = vec!["law@example.com".to_string(), "partner@example.com".to_string()];
        let notification = compose_notification(&clean, "site@example.com", &recipients);

        assert_eq!(notification.from, "\"BLG Website\" <site@example.com>");
        assert_eq!(notification.to, recipients);
        assert_eq!(notification.reply_to, "jane@example.com");
        assert_eq!(notification.subject, "[Website] New trademark inquiry from Jane Doe");
        assert!(notification.html.contains("Trademark Registration"));
        assert!(notification.html.contains("<div class=\"value\">ES</div>"));
        assert!(notification.text.contains("Language: es"));
        assert!(notification.text.contains("I need help with my visa application."));
    }

    #[test]
    fn test_service_label_passes_unknown_values_through() {
        assert_eq!(service_label("business"), "Business Formation");
        assert_eq!(service_label("General Inquiry"), "General Inquiry");
    }

    // ==================== Relay Tests ====================

    #[tokio::test]
    async fn test_submit_sends_one_notification() {
        let mailer = Arc::new(RecordingMailer::default());
        let relay = relay_with(Some(mailer.clone()));

        let receipt = relay.submit("10.0.0.1", valid_submission()).await.unwrap();

        assert!(receipt.reference.starts_with("BLG-"));
        assert_eq!(receipt.delivery, DeliveryOutcome::Sent);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reply_to, "jane@example.com");
    }

    #[tokio::test]
    async fn test_submit_invalid_sends_nothing() {
        let mailer = Arc::new(RecordingMailer::default());
        let relay = relay_with(Some(mailer.clone()));

        let submission = ContactSubmission {
            name: Some("A".to_string()),
            ..valid_submission()
        };
        let err = relay.submit("10.0.0.1", submission).await.unwrap_err();

        assert!(matches!(err, ContactError::Invalid(_)));
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_delivery_failure_still_succeeds() {
        let mailer = Arc::new(RecordingMailer {
            fail: true,
            ..Default::default()
        });
        let relay = relay_with(Some(mailer.clone()));

        let receipt = relay.submit("10.0.0.1", valid_submission()).await.unwrap();

        assert!(matches!(receipt.delivery, DeliveryOutcome::Failed(ref msg) if msg.contains("connection refused")));
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_without_mailer() {
        let relay = relay_with(None);
        let receipt = relay.submit("10.0.0.1", valid_submission()).await.unwrap();
        assert_eq!(receipt.delivery, DeliveryOutcome::NotConfigured);
    }

    #[tokio::test]
    async fn test_submit_sanitizes_before_mailing() {
        let mailer = Arc::new(RecordingMailer::default());
        let relay = relay_with(Some(mailer.clone()));

        let submission = ContactSubmission {
            message: Some("Hello <script>alert('x')</script> please call me".to_string()),
            ..valid_submission()
        };
        relay.submit("10.0.0.1", submission).await.unwrap();

        let sent = mailer.sent.lock().unwrap();
        assert!(!sent[0].text.contains('<'));
        assert!(!sent[0].text.contains('>'));
        assert!(sent[0].text.contains("scriptalert('x')/script"));
    }

    #[tokio::test]
    async fn test_submit_rate_limit_per_client() {
        let mailer = Arc::new(RecordingMailer::default());
        let relay = relay_with(Some(mailer.clone()));

        for _ in 0..5 {
            assert!(relay.submit("10.0.0.1", valid_submission()).await.is_ok());
        }
        let err = relay.submit("10.0.0.1", valid_submission()).await.unwrap_err();
        assert_eq!(err, ContactError::RateLimited);
        assert_eq!(mailer.sent.lock().unwrap().len(), 5);

        // Another address is unaffected
        assert!(relay.submit("10.0.0.2", valid_submission()).await.is_ok());
    }
}
