use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Credentials, JsonProtocolClient};
use crate::queue::{NotificationQueue, QueueMessage};

const TARGET_PREFIX: &str = "AmazonSQS";
const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// Queue client bound to one queue URL.
#[derive(Clone, Debug)]
pub struct SqsClient {
    inner: JsonProtocolClient,
    queue_url: String,
}

impl SqsClient {
    /// The endpoint defaults to the origin of `queue_url`.
    pub fn new(
        credentials: Credentials,
        region: &str,
        queue_url: &str,
        endpoint: Option<Url>,
    ) -> Result<Self> {
        let endpoint = match endpoint {
            Some(endpoint) => endpoint,
            None => {
                let parsed = Url::parse(queue_url)
                    .with_context(|| format!("invalid queue url {}", queue_url))?;
                parsed.join("/").context("derive queue endpoint")?
            }
        };
        Ok(Self {
            inner: JsonProtocolClient::new(
                credentials,
                endpoint,
                region,
                "sqs",
                TARGET_PREFIX,
                CONTENT_TYPE,
            ),
            queue_url: queue_url.to_string(),
        })
    }
}

impl NotificationQueue for SqsClient {
    fn receive_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>> {
        let request = ReceiveRequest {
            queue_url: &self.queue_url,
            max_number_of_messages: max_messages,
            message_attribute_names: &["All"],
        };
        let response: ReceiveResponse = self.inner.call("ReceiveMessage", &request)?;
        Ok(response.into_messages())
    }

    fn delete_message(&self, receipt_handle: &str) -> Result<()> {
        let request = DeleteRequest {
            queue_url: &self.queue_url,
            receipt_handle,
        };
        self.inner.call_raw("DeleteMessage", &request)?;
        Ok(())
    }
}

/// Parse a raw `ReceiveMessage` response body.
pub fn parse_receive_response(body: &str) -> Result<Vec<QueueMessage>> {
    let response: ReceiveResponse =
        serde_json::from_str(body).context("parse ReceiveMessage response")?;
    Ok(response.into_messages())
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveRequest<'a> {
    queue_url: &'a str,
    max_number_of_messages: u32,
    message_attribute_names: &'a [&'a str],
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveResponse {
    #[serde(default)]
    messages: Option<Vec<MessageWire>>,
}

impl ReceiveResponse {
    fn into_messages(self) -> Vec<QueueMessage> {
        self.messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| QueueMessage {
                message_id: m.message_id,
                receipt_handle: m.receipt_handle,
                body: m.body,
            })
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MessageWire {
    #[serde(default)]
    message_id: String,
    receipt_handle: String,
    #[serde(default)]
    body: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DeleteRequest<'a> {
    queue_url: &'a str,
    receipt_handle: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_queue_has_no_messages_field() {
        assert!(parse_receive_response("{}").unwrap().is_empty());
    }

    #[test]
    fn maps_messages() {
        let messages = parse_receive_response(
            concat!(
                r#"{"Messages":[{"MessageId":"m-1","ReceiptHandle":"rh-1","MD5OfBody":"x","#,
                r#""Body":"{\"Message\":\"{}\"}"}]}"#
            ),
        )
        .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].receipt_handle, "rh-1");
        assert_eq!(messages[0].body, r#"{"Message":"{}"}"#);
    }

    #[test]
    fn receive_request_field_names() {
        let request = ReceiveRequest {
            queue_url: "https://sqs.us-west-2.amazonaws.com/1/Queue",
            max_number_of_messages: 10,
            message_attribute_names: &["All"],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["MaxNumberOfMessages"], 10);
        assert_eq!(json["MessageAttributeNames"][0], "All");
    }

    #[test]
    fn endpoint_defaults_to_queue_origin() {
        let credentials = Credentials {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        };
        let client = SqsClient::new(
            credentials,
            "us-west-2",
            "https://sqs.us-west-2.amazonaws.com/123456789012/RekognitionVideoQueue",
            None,
        )
        .unwrap();
        assert_eq!(
            client.inner.endpoint().as_str(),
            "https://sqs.us-west-2.amazonaws.com/"
        );
    }
}
