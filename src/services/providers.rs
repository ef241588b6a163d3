//! Server-side transaction verification against payment provider APIs.
//!
//! A webhook body is never trusted on its own: after the signature check, the processor
//! asks the provider for its own record of the transaction.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::Secret;
use crate::models::webhook::WebhookSource;

/// The provider's view of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedTransaction {
    /// Provider says the charge succeeded
    pub succeeded: bool,
    /// Raw provider status, kept for logs
    pub status: String,
    /// Merchant reference (`tx_ref` / `reference`) on the provider's record
    pub reference: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} API key is not configured")]
    NotConfigured(WebhookSource),
    /// Includes timeouts; always retryable
    #[error("Provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Provider rejected verification: {0}")]
    Api(String),
    #[error("Invalid provider URL: {0}")]
    InvalidUrl(String),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn source(&self) -> WebhookSource;

    async fn verify_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<VerifiedTransaction, ProviderError>;
}

/// Build `base/seg1/seg2/...`, escaping each segment.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ProviderError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ProviderError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

fn parse_base(base: &str) -> Result<Url, ProviderError> {
    Url::parse(base).map_err(|e| ProviderError::InvalidUrl(format!("{base}: {e}")))
}

#[derive(Debug, Deserialize)]
struct FlutterwaveVerifyResponse {
    status: String,
    message: Option<String>,
    data: Option<FlutterwaveVerifyData>,
}

#[derive(Debug, Deserialize)]
struct FlutterwaveVerifyData {
    status: Option<String>,
    tx_ref: Option<String>,
}

/// `GET {base}/transactions/{id}/verify`
pub struct FlutterwaveClient {
    http: reqwest::Client,
    base: Url,
    secret_key: Option<Secret>,
}

impl FlutterwaveClient {
    pub fn new(base: &str, secret_key: Option<Secret>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(timeout)?,
            base: parse_base(base)?,
            secret_key,
        })
    }

    fn verify_url(&self, transaction_id: &str) -> Result<Url, ProviderError> {
        endpoint(&self.base, &["transactions", transaction_id, "verify"])
    }
}

#[async_trait]
impl PaymentProvider for FlutterwaveClient {
    fn source(&self) -> WebhookSource {
        WebhookSource::Flutterwave
    }

    async fn verify_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<VerifiedTransaction, ProviderError> {
        let key = self
            .secret_key
            .as_ref()
            .ok_or(ProviderError::NotConfigured(WebhookSource::Flutterwave))?;

        let response: FlutterwaveVerifyResponse = self
            .http
            .get(self.verify_url(transaction_id)?)
            .bearer_auth(key.reveal())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status != "success" {
            return Err(ProviderError::Api(
                response.message.unwrap_or(response.status),
            ));
        }
        let data = response
            .data
            .ok_or_else(|| ProviderError::Api("verification response has no data".to_string()))?;
        let status = data.status.unwrap_or_default();

        Ok(VerifiedTransaction {
            succeeded: status == "successful",
            status,
            reference: data.tx_ref,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaystackVerifyResponse {
    status: bool,
    message: Option<String>,
    data: Option<PaystackVerifyData>,
}

#[derive(Debug, Deserialize)]
struct PaystackVerifyData {
    status: Option<String>,
    reference: Option<String>,
}

/// `GET {base}/transaction/{id}`
pub struct PaystackClient {
    http: reqwest::Client,
    base: Url,
    secret_key: Option<Secret>,
}

impl PaystackClient {
    pub fn new(base: &str, secret_key: Option<Secret>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            http: http_client(timeout)?,
            base: parse_base(base)?,
            secret_key,
        })
    }

    fn verify_url(&self, transaction_id: &str) -> Result<Url, ProviderError> {
        endpoint(&self.base, &["transaction", transaction_id])
    }
}

#[async_trait]
impl PaymentProvider for PaystackClient {
    fn source(&self) -> WebhookSource {
        WebhookSource::Paystack
    }

    async fn verify_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<VerifiedTransaction, ProviderError> {
        let key = self
            .secret_key
            .as_ref()
            .ok_or(ProviderError::NotConfigured(WebhookSource::Paystack))?;

        let response: PaystackVerifyResponse = self
            .http
            .get(self.verify_url(transaction_id)?)
            .bearer_auth(key.reveal())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !response.status {
            return Err(ProviderError::Api(
                response.message.unwrap_or_else(|| "verification failed".to_string()),
            ));
        }
        let data = response
            .data
            .ok_or_else(|| ProviderError::Api("verification response has no data".to_string()))?;
        let status = data.status.unwrap_or_default();

        Ok(VerifiedTransaction {
            succeeded: status == "success",
            status,
            reference: data.reference,
        })
    }
}

/// Provider double that answers every verification with a preset reply.
#[cfg(test)]
pub struct ScriptedProvider {
    source: WebhookSource,
    /// `None` simulates an unreachable provider
    reply: std::sync::Mutex<Option<VerifiedTransaction>>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl ScriptedProvider {
    pub fn succeeding(source: WebhookSource, reference: &str) -> Self {
        Self::replying(
            source,
            Some(VerifiedTransaction {
                succeeded: true,
                status: "successful".to_string(),
                reference: Some(reference.to_string()),
            }),
        )
    }

    pub fn replying(source: WebhookSource, reply: Option<VerifiedTransaction>) -> Self {
        Self {
            source,
            reply: std::sync::Mutex::new(reply),
            calls: Default::default(),
        }
    }

    pub fn set_reply(&self, reply: Option<VerifiedTransaction>) {
        *self.reply.lock().unwrap() = reply;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl PaymentProvider for ScriptedProvider {
    fn source(&self) -> WebhookSource {
        self.source
    }

    async fn verify_transaction(
        &self,
        _transaction_id: &str,
    ) -> Result<VerifiedTransaction, ProviderError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.reply
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::Api("provider unavailable".to_string()))
    }
}
