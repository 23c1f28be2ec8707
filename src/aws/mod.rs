//! Concrete clients for the managed services, over HTTPS with SigV4 signing.
//!
//! - `RekognitionClient`: celebrity recognition (JSON 1.1 protocol)
//! - `SqsClient`: notification queue (JSON 1.0 protocol)
//! - `S3Client`: object downloads
//!
//! Credentials come from the standard `AWS_*` environment variables. Every
//! client accepts an endpoint override so it can be pointed at a local
//! emulator.

mod rekognition;
mod s3;
pub mod sigv4;
mod sqs;

pub use rekognition::{parse_recognize_response, parse_results_page, RekognitionClient};
pub use s3::S3Client;
pub use sqs::{parse_receive_response, SqsClient};

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

use sigv4::SigningParams;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Static AWS credentials.
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        let access_key_id = non_empty_env("AWS_ACCESS_KEY_ID")
            .ok_or_else(|| anyhow!("AWS_ACCESS_KEY_ID must be set"))?;
        let secret_access_key = non_empty_env("AWS_SECRET_ACCESS_KEY")
            .ok_or_else(|| anyhow!("AWS_SECRET_ACCESS_KEY must be set"))?;
        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token: non_empty_env("AWS_SESSION_TOKEN"),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub(crate) fn http_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(CONNECT_TIMEOUT)
        .timeout_read(IO_TIMEOUT)
        .timeout_write(IO_TIMEOUT)
        .build()
}

/// Default regional endpoint for a service.
pub(crate) fn regional_endpoint(service: &str, region: &str) -> Result<Url> {
    Url::parse(&format!("https://{}.{}.amazonaws.com/", service, region))
        .with_context(|| format!("build {} endpoint for region {}", service, region))
}

/// Error body shared by the JSON protocols.
#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(rename = "__type", default)]
    error_type: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Turn a non-2xx response into an error naming the service error code.
pub(crate) fn service_error(service: &str, status: u16, body: &str) -> anyhow::Error {
    let parsed: Option<ServiceErrorBody> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|b| b.error_type.as_deref())
        .map(|t| t.rsplit('#').next().unwrap_or(t).to_string())
        .unwrap_or_else(|| "UnknownError".to_string());
    let message = parsed
        .and_then(|b| b.message)
        .unwrap_or_else(|| body.chars().take(200).collect());
    anyhow!("{} returned HTTP {} {}: {}", service, status, code, message)
}

/// Send a request, mapping HTTP error statuses to service errors.
pub(crate) fn send(
    service: &str,
    request: ureq::Request,
    body: Option<&[u8]>,
) -> Result<ureq::Response> {
    let result = match body {
        Some(bytes) => request.send_bytes(bytes),
        None => request.call(),
    };
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, response)) => {
            let text = response.into_string().unwrap_or_default();
            Err(service_error(service, status, &text))
        }
        Err(e) => Err(anyhow!("{} transport error: {}", service, e)),
    }
}

/// Client for the AWS JSON protocols: every operation is a signed POST to
/// the endpoint root with an `X-Amz-Target` header.
#[derive(Clone, Debug)]
pub(crate) struct JsonProtocolClient {
    agent: ureq::Agent,
    credentials: Credentials,
    endpoint: Url,
    region: String,
    signing_name: &'static str,
    target_prefix: &'static str,
    content_type: &'static str,
}

impl JsonProtocolClient {
    pub(crate) fn new(
        credentials: Credentials,
        endpoint: Url,
        region: &str,
        signing_name: &'static str,
        target_prefix: &'static str,
        content_type: &'static str,
    ) -> Self {
        Self {
            agent: http_agent(),
            credentials,
            endpoint,
            region: region.to_string(),
            signing_name,
            target_prefix,
            content_type,
        }
    }

    #[cfg(test)]
    pub(crate) fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Invoke `operation` and parse the JSON response.
    pub(crate) fn call<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        operation: &str,
        request: &Req,
    ) -> Result<Resp> {
        let text = self.call_raw(operation, request)?;
        serde_json::from_str(&text)
            .with_context(|| format!("parse {}.{} response", self.target_prefix, operation))
    }

    /// Invoke `operation` and return the raw response body.
    pub(crate) fn call_raw<Req: Serialize>(
        &self,
        operation: &str,
        request: &Req,
    ) -> Result<String> {
        let body = serde_json::to_vec(request)
            .with_context(|| format!("serialize {} request", operation))?;
        let target = format!("{}.{}", self.target_prefix, operation);
        let params = SigningParams {
            credentials: &self.credentials,
            region: &self.region,
            service: self.signing_name,
            time: chrono::Utc::now(),
        };
        let signed = sigv4::sign(
            &params,
            "POST",
            &self.endpoint,
            &[("content-type", self.content_type), ("x-amz-target", &target)],
            &sigv4::sha256_hex(&body),
        )?;

        let mut request = self
            .agent
            .request_url("POST", &self.endpoint)
            .set("Content-Type", self.content_type)
            .set("X-Amz-Target", &target);
        for (name, value) in &signed {
            request = request.set(name, value);
        }

        let response = send(self.signing_name, request, Some(&body))
            .with_context(|| format!("call {}", target))?;
        response
            .into_string()
            .with_context(|| format!("read {} response", target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_names_the_code() {
        let err = service_error(
            "rekognition",
            400,
            concat!(
                r#"{"__type":"com.amazonaws.rekognition#InvalidS3ObjectException","#,
                r#""Message":"Unable to get object metadata from S3"}"#
            ),
        );
        let text = err.to_string();
        assert!(text.contains("HTTP 400 InvalidS3ObjectException"));
        assert!(text.contains("Unable to get object metadata"));
    }

    #[test]
    fn service_error_tolerates_non_json_bodies() {
        let err = service_error("s3", 403, "<Error><Code>AccessDenied</Code></Error>");
        assert!(err.to_string().contains("HTTP 403 UnknownError"));
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let credentials = Credentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "very-secret".to_string(),
            session_token: Some("token".to_string()),
        };
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("AKID"));
        assert!(!debug.contains("very-secret"));
        assert!(!debug.contains("token\""));
    }
}
