//! Contact form forwarding: POST the visitor's details to the automation webhook.
//!
//! One request, no retry, no auth. The caller shows success or a retry prompt.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SOURCE: &str = "Website Contact Form";

/// Fields collected by the site's contact form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub whatsapp: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ContactError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook rejected submission: {0}")]
    Rejected(reqwest::StatusCode),
}

impl ContactForm {
    /// Every field is required.
    pub fn validate(&self) -> Result<(), ContactError> {
        let fields = [
            ("name", &self.name),
            ("whatsapp", &self.whatsapp),
            ("email", &self.email),
            ("message", &self.message),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ContactError::MissingField(field));
            }
        }
        Ok(())
    }
}

/// Body sent to the webhook: the form plus timestamp and source tag.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPayload<'a> {
    #[serde(flatten)]
    pub form: &'a ContactForm,
    pub submitted_at: String,
    pub source: &'a str,
}

impl<'a> ContactPayload<'a> {
    pub fn new(form: &'a ContactForm, source: &'a str, at: DateTime<Utc>) -> Self {
        Self {
            form,
            submitted_at: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            source,
        }
    }
}

/// Posts contact forms to a fixed webhook URL.
#[derive(Clone)]
pub struct ContactClient {
    webhook_url: String,
    source: String,
    client: reqwest::Client,
}

impl ContactClient {
    pub fn new(webhook_url: impl Into<String>, source: Option<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            source: source
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            client: reqwest::Client::new(),
        }
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }

    /// Validate and forward the form.
    pub async fn submit(&self, form: &ContactForm) -> Result<(), ContactError> {
        form.validate()?;
        let payload = ContactPayload::new(form, &self.source, Utc::now());
        let res = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;
        if !res.status().is_success() {
            log::warn!("contact: webhook returned {}", res.status());
            return Err(ContactError::Rejected(res.status()));
        }
        log::info!("contact: submission forwarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn form() -> ContactForm {
        ContactForm {
            name: "Ana".to_string(),
            whatsapp: "(51) 98469-7497".to_string(),
            email: "ana@example.com".to_string(),
            message: "Quero anunciar".to_string(),
        }
    }

    #[test]
    fn validate_requires_every_field() {
        assert!(form().validate().is_ok());

        let mut f = form();
        f.email = "  ".to_string();
        assert!(matches!(f.validate(), Err(ContactError::MissingField("email"))));

        let empty = ContactForm::default();
        assert!(matches!(empty.validate(), Err(ContactError::MissingField("name"))));
    }

    #[test]
    fn payload_carries_timestamp_and_source() {
        let f = form();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let json = serde_json::to_value(ContactPayload::new(&f, DEFAULT_SOURCE, at)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Ana",
                "whatsapp": "(51) 98469-7497",
                "email": "ana@example.com",
                "message": "Quero anunciar",
                "submittedAt": "2024-05-01T12:30:00.000Z",
                "source": "Website Contact Form"
            })
        );
    }

    #[test]
    fn blank_source_uses_default() {
        let c = ContactClient::new("http://localhost/hook", Some(" ".to_string()));
        assert_eq!(c.source, DEFAULT_SOURCE);
    }
}
