//! Webhook subscriber records.

use serde::{Deserialize, Serialize};

use crate::{Currency, CurrencyPair, RatewatchError, Result, SubscriberId};

/// A subscription registration before the registry assigns an id.
///
/// Every field is required when parsed from JSON. Extra fields, including a
/// client-supplied `id`, are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubscriber {
    #[serde(rename = "webhookURL")]
    pub webhook_url: String,
    pub base_currency: Currency,
    pub target_currency: Currency,
    pub min_trigger_value: f64,
    pub max_trigger_value: f64,
}

impl NewSubscriber {
    /// Create a registration.
    pub fn new(
        webhook_url: impl Into<String>,
        base_currency: impl Into<Currency>,
        target_currency: impl Into<Currency>,
        min_trigger_value: f64,
        max_trigger_value: f64,
    ) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            base_currency: base_currency.into(),
            target_currency: target_currency.into(),
            min_trigger_value,
            max_trigger_value,
        }
    }

    /// Parse and validate a registration body.
    pub fn from_json(body: &str) -> Result<Self> {
        let subscriber: NewSubscriber = serde_json::from_str(body)
            .map_err(|e| RatewatchError::validation(format!("malformed subscriber: {e}")))?;
        subscriber.validate()?;
        Ok(subscriber)
    }

    /// Validate the record.
    pub fn validate(&self) -> Result<()> {
        let url = self.webhook_url.trim();
        if url.is_empty() {
            return Err(RatewatchError::invalid_field("webhookURL", "webhook URL is empty"));
        }

        let host = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"));
        match host {
            Some(rest) if !rest.is_empty() && !rest.starts_with('/') => {}
            _ => {
                return Err(RatewatchError::invalid_field(
                    "webhookURL",
                    format!("webhook URL must be an absolute http(s) URL: {url}"),
                ))
            }
        }

        for (field, currency) in [
            ("baseCurrency", &self.base_currency),
            ("targetCurrency", &self.target_currency),
        ] {
            if !currency.is_well_formed() {
                return Err(RatewatchError::invalid_field(
                    field,
                    format!("not a currency code: {currency:?}"),
                ));
            }
        }

        if !self.min_trigger_value.is_finite() || !self.max_trigger_value.is_finite() {
            return Err(RatewatchError::validation("trigger values must be finite"));
        }

        if self.min_trigger_value > self.max_trigger_value {
            return Err(RatewatchError::invalid_field(
                "minTriggerValue",
                format!(
                    "minTriggerValue {} exceeds maxTriggerValue {}",
                    self.min_trigger_value, self.max_trigger_value
                ),
            ));
        }

        Ok(())
    }

    /// Attach a registry-assigned id.
    pub fn into_subscriber(self, id: SubscriberId) -> Subscriber {
        Subscriber {
            id,
            webhook_url: self.webhook_url,
            base_currency: self.base_currency,
            target_currency: self.target_currency,
            min_trigger_value: self.min_trigger_value,
            max_trigger_value: self.max_trigger_value,
        }
    }
}

/// A registered webhook subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: SubscriberId,
    #[serde(rename = "webhookURL")]
    pub webhook_url: String,
    pub base_currency: Currency,
    pub target_currency: Currency,
    pub min_trigger_value: f64,
    pub max_trigger_value: f64,
}

impl Subscriber {
    /// The watched currency pair.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.base_currency.clone(), self.target_currency.clone())
    }

    /// Check if a rate lies within the inclusive trigger band.
    pub fn in_band(&self, rate: f64) -> bool {
        self.min_trigger_value <= rate && rate <= self.max_trigger_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_BODY: &str = r#"{
        "webhookURL": "http://remoteUrl:8080/randomWebhookPath",
        "baseCurrency": "EUR",
        "targetCurrency": "NOK",
        "minTriggerValue": 1.50,
        "maxTriggerValue": 2.55
    }"#;

    #[test]
    fn test_from_json_valid() {
        let sub = NewSubscriber::from_json(VALID_BODY).unwrap();
        assert_eq!(sub.webhook_url, "http://remoteUrl:8080/randomWebhookPath");
        assert_eq!(sub.base_currency, Currency::eur());
        assert_eq!(sub.target_currency, Currency::nok());
        assert_eq!(sub.min_trigger_value, 1.5);
        assert_eq!(sub.max_trigger_value, 2.55);
    }

    #[test]
    fn test_from_json_missing_field() {
        let body = r#"{
            "webhookURL": "http://remoteUrl:8080/randomWebhookPath",
            "baseCurrency": "EUR",
            "targetCurrency": "NOK",
            "maxTriggerValue": 2.55
        }"#;
        let err = NewSubscriber::from_json(body).unwrap_err();
        assert!(err.to_string().contains("minTriggerValue"));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_from_json_ignores_extra_fields() {
        let body = r#"{
            "id": 99,
            "webhookURL": "http://remoteUrl:8080/randomWebhookPath",
            "baseCurrency": "EUR",
            "targetCurrency": "NOK",
            "minTriggerValue": 1.50,
            "maxTriggerValue": 2.55,
            "note": "weekly"
        }"#;
        let sub = NewSubscriber::from_json(body).unwrap();
        assert_eq!(sub, NewSubscriber::from_json(VALID_BODY).unwrap());
    }

    #[test]
    fn test_from_json_malformed() {
        let body = r#"{ "webhookURL": "http://remoteUrl:8080/randomWebhookPath"", }"#;
        assert!(NewSubscriber::from_json(body).is_err());
    }

    #[test]
    fn test_validate_band_order() {
        let sub = NewSubscriber::new("https://hooks.example/x", "EUR", "NOK", 12.0, 11.0);
        let err = sub.validate().unwrap_err();
        assert!(matches!(
            err,
            RatewatchError::Validation { field: Some(ref f), .. } if f == "minTriggerValue"
        ));

        let equal = NewSubscriber::new("https://hooks.example/x", "EUR", "NOK", 11.0, 11.0);
        assert!(equal.validate().is_ok());
    }

    #[test]
    fn test_validate_url() {
        for url in ["", "   ", "ftp://hooks.example", "http://", "https:///path", "hooks.example"] {
            let sub = NewSubscriber::new(url, "EUR", "NOK", 1.0, 2.0);
            assert!(sub.validate().is_err(), "accepted {url:?}");
        }
    }

    #[test]
    fn test_validate_currency_codes() {
        let sub = NewSubscriber::new("http://hooks.example", "", "NOK", 1.0, 2.0);
        assert!(sub.validate().is_err());

        let sub = NewSubscriber::new("http://hooks.example", "EUR", "N0K", 1.0, 2.0);
        assert!(sub.validate().is_err());
    }

    #[test]
    fn test_validate_non_finite() {
        let sub = NewSubscriber::new("http://hooks.example", "EUR", "NOK", f64::NAN, 2.0);
        assert!(sub.validate().is_err());
    }

    #[test]
    fn test_in_band_inclusive() {
        let sub = NewSubscriber::new("http://hooks.example", "EUR", "NOK", 9.0, 11.0)
            .into_subscriber(SubscriberId::new(1));
        assert!(sub.in_band(9.0));
        assert!(sub.in_band(10.0));
        assert!(sub.in_band(11.0));
        assert!(!sub.in_band(11.0001));
        assert!(!sub.in_band(8.9999));
    }

    #[test]
    fn test_subscriber_json_field_names() {
        let sub = NewSubscriber::new("http://hooks.example", "EUR", "NOK", 9.0, 11.0)
            .into_subscriber(SubscriberId::new(4));
        let json = serde_json::to_value(&sub).unwrap();
        assert_eq!(json["id"], 4);
        assert_eq!(json["webhookURL"], "http://hooks.example");
        assert_eq!(json["baseCurrency"], "EUR");
        assert_eq!(json["minTriggerValue"], 9.0);
    }
}
