//! Notification queue contract and job-status envelope parsing.
//!
//! Completion notifications reach the queue through a topic subscription, so
//! each message body is a topic envelope whose `Message` field holds the
//! serialized job-status record:
//!
//! ```json
//! { "Type": "Notification", "Message": "{\"JobId\":\"…\",\"Status\":\"SUCCEEDED\"}" }
//! ```

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::recognition::JobStatus;

/// One physical message received from the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    /// Handle used to delete this delivery of the message.
    pub receipt_handle: String,
    pub body: String,
}

/// Queue the job notifications are delivered to.
pub trait NotificationQueue {
    /// Receive up to `max_messages` messages. An empty vector means the queue
    /// had nothing to deliver.
    fn receive_batch(&self, max_messages: u32) -> Result<Vec<QueueMessage>>;

    /// Acknowledge a message so it is not delivered again.
    fn delete_message(&self, receipt_handle: &str) -> Result<()>;
}

/// Outer topic envelope. Only the payload is read.
#[derive(Debug, Deserialize)]
pub struct TopicEnvelope {
    /// Serialized job-status record.
    #[serde(rename = "Message")]
    pub message: String,
}

/// Inner job-status record published by the recognition service.
#[derive(Debug, Deserialize)]
pub struct JobStatusRecord {
    #[serde(rename = "JobId")]
    pub job_id: String,

    #[serde(rename = "Status")]
    pub status: String,
}

/// Parsed notification for one job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationEvent {
    pub job_id: String,
    pub status: JobStatus,
}

/// Parse a queue message body into a notification event.
///
/// Returns an error if either the envelope or the inner record is malformed.
pub fn parse_notification(body: &str) -> Result<NotificationEvent> {
    let envelope: TopicEnvelope =
        serde_json::from_str(body).map_err(|e| anyhow!("envelope parse error: {}", e))?;
    let record: JobStatusRecord = serde_json::from_str(&envelope.message)
        .map_err(|e| anyhow!("job status parse error: {}", e))?;

    Ok(NotificationEvent {
        job_id: record.job_id,
        status: JobStatus::parse(&record.status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUCCEEDED_BODY: &str = concat!(
        r#"{
        "Type": "Notification",
        "MessageId": "6c3d4a1e-0000-0000-0000-000000000000",
        "TopicArn": "arn:aws:sns:us-west-2:123456789012:RekognitionVideoTopic",
        "Message": "{\"JobId\":\"job-42\",\"Status\":\"SUCCEEDED\","#,
        r#"\"API\":\"StartCelebrityRecognition\",\"Timestamp\":1700000000000}"
    }"#
    );

    #[test]
    fn parse_succeeded_notification() {
        let event = parse_notification(SUCCEEDED_BODY).unwrap();
        assert_eq!(event.job_id, "job-42");
        assert_eq!(event.status, JobStatus::Succeeded);
    }

    #[test]
    fn parse_failed_notification() {
        let body = r#"{"Message":"{\"JobId\":\"job-7\",\"Status\":\"FAILED\"}"}"#;
        let event = parse_notification(body).unwrap();
        assert_eq!(event.status, JobStatus::Failed);
    }

    #[test]
    fn malformed_envelope_rejected() {
        let err = parse_notification("not json").unwrap_err();
        assert!(err.to_string().contains("envelope parse error"));
    }

    #[test]
    fn malformed_inner_record_rejected() {
        let body = r#"{"Message":"{\"JobId\":\"job-7\"}"}"#;
        let err = parse_notification(body).unwrap_err();
        assert!(err.to_string().contains("job status parse error"));
    }
}
