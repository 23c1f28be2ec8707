use anyhow::{Context, Result};
use std::io::Write;
use url::Url;

use super::sigv4::{self, SigningParams};
use super::{http_agent, send, Credentials};
use crate::store::ObjectStore;

/// S3 object download client.
#[derive(Clone, Debug)]
pub struct S3Client {
    agent: ureq::Agent,
    credentials: Credentials,
    region: String,
    /// Path-style endpoint override (emulators). `None` uses
    /// virtual-hosted buckets on the regional endpoint.
    endpoint: Option<Url>,
}

impl S3Client {
    pub fn new(credentials: Credentials, region: &str, endpoint: Option<Url>) -> Self {
        Self {
            agent: http_agent(),
            credentials,
            region: region.to_string(),
            endpoint,
        }
    }

    /// URL of an object.
    pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let encoded_key = sigv4::uri_encode(key, false);
        let raw = match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.as_str().trim_end_matches('/'),
                bucket,
                encoded_key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                bucket, self.region, encoded_key
            ),
        };
        Url::parse(&raw).with_context(|| format!("build url for s3://{}/{}", bucket, key))
    }
}

impl ObjectStore for S3Client {
    fn download(&self, bucket: &str, key: &str, sink: &mut dyn Write) -> Result<u64> {
        let url = self.object_url(bucket, key)?;
        let params = SigningParams {
            credentials: &self.credentials,
            region: &self.region,
            service: "s3",
            time: chrono::Utc::now(),
        };
        let signed = sigv4::sign(
            &params,
            "GET",
            &url,
            &[("x-amz-content-sha256", sigv4::UNSIGNED_PAYLOAD)],
            sigv4::UNSIGNED_PAYLOAD,
        )?;

        let mut request = self
            .agent
            .request_url("GET", &url)
            .set("x-amz-content-sha256", sigv4::UNSIGNED_PAYLOAD);
        for (name, value) in &signed {
            request = request.set(name, value);
        }

        let response = send("s3", request, None)
            .with_context(|| format!("GetObject s3://{}/{}", bucket, key))?;
        let mut reader = response.into_reader();
        let bytes = std::io::copy(&mut reader, sink)
            .with_context(|| format!("stream s3://{}/{}", bucket, key))?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        }
    }

    #[test]
    fn virtual_hosted_url_encodes_key_segments() {
        let client = S3Client::new(credentials(), "us-west-2", None);
        let url = client.object_url("videos", "clips/my clip.mp4").unwrap();
        assert_eq!(
            url.as_str(),
            "https://videos.s3.us-west-2.amazonaws.com/clips/my%20clip.mp4"
        );
    }

    #[test]
    fn endpoint_override_is_path_style() {
        let endpoint = Url::parse("http://localhost:4566").unwrap();
        let client = S3Client::new(credentials(), "us-east-1", Some(endpoint));
        let url = client.object_url("videos", "a/b.mp4").unwrap();
        assert_eq!(url.as_str(), "http://localhost:4566/videos/a/b.mp4");
    }
}
