//! Recognition provider HTTP client
//!
//! Sends an audio sample to the provider's identify endpoint as a multipart
//! POST carrying an HMAC-SHA1 signature over the canonical string
//! `POST\n/v1/identify\nACCESS_KEY\naudio\n1\nTIMESTAMP`, keyed by the
//! shared secret and base64-encoded.

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::recognize::types::ProviderResponse;
use crate::recognize::Recognizer;
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use soundlens_common::RecognitionOutcome;
use std::time::Duration;
use tracing::debug;

const IDENTIFY_PATH: &str = "/v1/identify";
const DATA_TYPE: &str = "audio";
const SIGNATURE_VERSION: &str = "1";

type HmacSha1 = Hmac<Sha1>;

/// ACRCloud-style identification client
pub struct AcrCloudClient {
    http_client: reqwest::Client,
    host: String,
    access_key: String,
    access_secret: String,
}

impl AcrCloudClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            host: config.host.clone(),
            access_key: config.access_key.clone(),
            access_secret: config.access_secret.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("https://{}{}", self.host, IDENTIFY_PATH)
    }

    /// Classify the provider's parsed response into an outcome
    fn classify(response: ProviderResponse) -> RecognitionOutcome {
        if response.status.code != 0 {
            debug!(
                code = response.status.code,
                msg = %response.status.msg,
                "Provider reported no match"
            );
            return RecognitionOutcome::NoMatch;
        }

        // First candidate is authoritative
        let candidate = response
            .metadata
            .and_then(|m| m.music.into_iter().next());

        match candidate {
            Some(music) => RecognitionOutcome::Matched {
                track: music.into_track(),
            },
            None => RecognitionOutcome::NoMatch,
        }
    }
}

/// Compute the base64-encoded HMAC-SHA1 request signature
pub fn sign(string_to_sign: &str, secret: &str) -> String {
    // HMAC accepts keys of any length; new_from_slice cannot fail here
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(string_to_sign.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Build the canonical string the signature covers
pub fn string_to_sign(access_key: &str, timestamp: i64) -> String {
    format!(
        "POST\n{}\n{}\n{}\n{}\n{}",
        IDENTIFY_PATH, access_key, DATA_TYPE, SIGNATURE_VERSION, timestamp
    )
}

#[async_trait]
impl Recognizer for AcrCloudClient {
    async fn identify(&self, sample: &[u8]) -> Result<RecognitionOutcome> {
        if sample.is_empty() {
            return Err(Error::BadRequest("Empty audio sample".to_string()));
        }

        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign(&string_to_sign(&self.access_key, timestamp), &self.access_secret);

        let form = reqwest::multipart::Form::new()
            .part(
                "sample",
                reqwest::multipart::Part::bytes(sample.to_vec()).file_name("sample"),
            )
            .text("sample_bytes", sample.len().to_string())
            .text("access_key", self.access_key.clone())
            .text("data_type", DATA_TYPE)
            .text("signature_version", SIGNATURE_VERSION)
            .text("signature", signature)
            .text("timestamp", timestamp.to_string());

        debug!(sample_bytes = sample.len(), "Dispatching identify request");

        let response = match self.http_client.post(self.endpoint()).multipart(form).send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(RecognitionOutcome::Failed {
                    reason: format!("Transport error: {}", e),
                })
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(RecognitionOutcome::Failed {
                reason: format!("Provider HTTP {}", status),
            });
        }

        match response.json::<ProviderResponse>().await {
            Ok(parsed) => Ok(Self::classify(parsed)),
            Err(e) => Ok(RecognitionOutcome::Failed {
                reason: format!("Malformed provider response: {}", e),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognize::types::ProviderResponse;

    #[test]
    fn test_string_to_sign_layout() {
        let s = string_to_sign("AK", 1700000000);
        assert_eq!(s, "POST\n/v1/identify\nAK\naudio\n1\n1700000000");
    }

    #[test]
    fn test_hmac_sha1_known_vector() {
        // RFC 2202 test case 2
        let signature = sign("what do ya want for nothing?", "Jefe");
        assert_eq!(signature, "7/zfauXrL6LSdBbV8YTfnCWafHk=");
    }

    #[test]
    fn test_classify_success_takes_first_candidate() {
        let response: ProviderResponse = serde_json::from_str(
            r#"{
                "status": {"code": 0, "msg": "Success"},
                "metadata": {"music": [
                    {"title": "First", "artists": [{"name": "A"}]},
                    {"title": "Second", "artists": [{"name": "B"}]}
                ]}
            }"#,
        )
        .unwrap();

        match AcrCloudClient::classify(response) {
            RecognitionOutcome::Matched { track } => {
                assert_eq!(track.title.as_deref(), Some("First"));
            }
            other => panic!("expected match, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_nonzero_status_is_no_match() {
        let response: ProviderResponse =
            serde_json::from_str(r#"{"status": {"code": 1001, "msg": "No result"}}"#).unwrap();
        assert_eq!(AcrCloudClient::classify(response), RecognitionOutcome::NoMatch);
    }

    #[test]
    fn test_classify_success_without_candidates_is_no_match() {
        let response: ProviderResponse = serde_json::from_str(
            r#"{"status": {"code": 0, "msg": "Success"}, "metadata": {"music": []}}"#,
        )
        .unwrap();
        assert_eq!(AcrCloudClient::classify(response), RecognitionOutcome::NoMatch);
    }

    #[tokio::test]
    async fn test_empty_sample_is_rejected() {
        let client = AcrCloudClient::new(&crate::config::ProviderConfig {
            host: "example.com".to_string(),
            access_key: "k".to_string(),
            access_secret: "s".to_string(),
            timeout_secs: 1,
        })
        .unwrap();

        let result = client.identify(&[]).await;
        assert!(matches!(result, Err(Error::BadRequest(_))));
    }
}
