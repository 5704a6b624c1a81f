//! Azure Queue Storage implementation of [`NotificationSink`] and [`MessageSource`].

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::transport::{error_from_response, xml_escape, xml_tag, xml_unescape, Body, StorageTransport};
use super::{MessageSource, NotificationSink, QueueMessage, StorageAccount, StorageError};
use crate::config::MessageEncoding;

/// Queue client for one storage account.
#[derive(Debug, Clone)]
pub struct AzureQueueClient {
    transport: StorageTransport,
    encoding: MessageEncoding,
}

impl AzureQueueClient {
    pub fn new(
        account: StorageAccount,
        timeout: Duration,
        encoding: MessageEncoding,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            transport: StorageTransport::new(account, timeout)?,
            encoding,
        })
    }

    pub fn from_connection_string(
        connection_string: &str,
        timeout: Duration,
        encoding: MessageEncoding,
    ) -> Result<Self, StorageError> {
        Self::new(
            StorageAccount::from_connection_string(connection_string)?,
            timeout,
            encoding,
        )
    }

    pub fn encoding(&self) -> MessageEncoding {
        self.encoding
    }

    fn queue_url(&self, segments: &[&str]) -> Result<Url, StorageError> {
        let mut url = self.transport.account().queue_endpoint.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                StorageError::InvalidRequest("queue endpoint cannot be a base".into())
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn put_message(&self, queue: &str, text: &str) -> Result<(), StorageError> {
        let url = self.queue_url(&[queue, "messages"])?;
        let body = format!(
            "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
            xml_escape(text)
        );

        let response = self
            .transport
            .send(
                Method::POST,
                url,
                &[],
                Some(Body {
                    bytes: body.into_bytes(),
                    content_type: "application/xml",
                }),
            )
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, queue).await);
        }
        Ok(())
    }

    async fn create_queue(&self, queue: &str) -> Result<(), StorageError> {
        let url = self.queue_url(&[queue])?;
        let response = self.transport.send(Method::PUT, url, &[], None).await?;

        // 204 means the queue already existed with identical metadata.
        if !response.status().is_success() {
            return Err(error_from_response(response, queue).await);
        }
        info!("Created queue {}", queue);
        Ok(())
    }
}

/// Encode a payload for the queue according to `encoding`.
pub fn encode_message(text: &str, encoding: MessageEncoding) -> String {
    match encoding {
        MessageEncoding::Base64 => general_purpose::STANDARD.encode(text.as_bytes()),
        MessageEncoding::None => text.to_string(),
    }
}

/// Recover the message body from queue text.
///
/// With base64 encoding, text that is not valid base64 is passed through
/// unchanged so raw JSON messages are still readable.
pub fn decode_message(text: &str, encoding: MessageEncoding) -> Vec<u8> {
    match encoding {
        MessageEncoding::Base64 => general_purpose::STANDARD
            .decode(text.trim())
            .unwrap_or_else(|_| text.as_bytes().to_vec()),
        MessageEncoding::None => text.as_bytes().to_vec(),
    }
}

fn parse_messages(xml: &str) -> Result<Vec<QueueMessage>, StorageError> {
    let mut messages = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find("<QueueMessage>") {
        let after = &rest[start + "<QueueMessage>".len()..];
        let end = after
            .find("</QueueMessage>")
            .ok_or_else(|| StorageError::Decode("unterminated QueueMessage element".into()))?;
        let block = &after[..end];

        let field = |tag: &str| {
            xml_tag(block, tag)
                .ok_or_else(|| StorageError::Decode(format!("QueueMessage without {}", tag)))
        };
        let dequeue_count = field("DequeueCount")?
            .trim()
            .parse()
            .map_err(|e| StorageError::Decode(format!("bad DequeueCount: {}", e)))?;

        messages.push(QueueMessage {
            id: field("MessageId")?.to_string(),
            pop_receipt: xml_unescape(field("PopReceipt")?),
            dequeue_count,
            text: xml_unescape(field("MessageText")?),
        });

        rest = &after[end + "</QueueMessage>".len()..];
    }

    Ok(messages)
}

#[async_trait]
impl NotificationSink for AzureQueueClient {
    async fn enqueue(&self, queue: &str, payload: &Value) -> Result<(), StorageError> {
        let text = encode_message(&payload.to_string(), self.encoding);
        debug!("Enqueueing notification on {}", queue);
        self.send_text(queue, &text).await
    }
}

#[async_trait]
impl MessageSource for AzureQueueClient {
    async fn receive(
        &self,
        queue: &str,
        max_messages: u32,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, StorageError> {
        let mut url = self.queue_url(&[queue, "messages"])?;
        url.query_pairs_mut()
            .append_pair("numofmessages", &max_messages.to_string())
            .append_pair("visibilitytimeout", &visibility_timeout.as_secs().to_string());

        let response = self.transport.send(Method::GET, url, &[], None).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response, queue).await);
        }

        let body = response.text().await?;
        parse_messages(&body)
    }

    async fn delete(&self, queue: &str, message: &QueueMessage) -> Result<(), StorageError> {
        let mut url = self.queue_url(&[queue, "messages", message.id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("popreceipt", &message.pop_receipt);

        let response = self.transport.send(Method::DELETE, url, &[], None).await?;
        match response.status() {
            StatusCode::NOT_FOUND => {
                warn!(
                    "Message {} already gone from {} (visibility expired?)",
                    message.id, queue
                );
                Ok(())
            }
            status if status.is_success() => Ok(()),
            _ => Err(error_from_response(response, queue).await),
        }
    }

    async fn send_text(&self, queue: &str, text: &str) -> Result<(), StorageError> {
        match self.put_message(queue, text).await {
            Err(StorageError::NotFound(_)) => {
                self.create_queue(queue).await?;
                self.put_message(queue, text).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client_for(server: &Server, encoding: MessageEncoding) -> AzureQueueClient {
        let connection = format!(
            "BlobEndpoint={}/acct;QueueEndpoint={}/acct",
            server.url(),
            server.url()
        );
        AzureQueueClient::from_connection_string(&connection, Duration::from_secs(5), encoding)
            .unwrap()
    }

    #[test]
    fn test_encode_decode_message() {
        let encoded = encode_message(r#"{"job_id":"J1"}"#, MessageEncoding::Base64);
        assert_eq!(encoded, "eyJqb2JfaWQiOiJKMSJ9");
        assert_eq!(
            decode_message(&encoded, MessageEncoding::Base64),
            br#"{"job_id":"J1"}"#.to_vec()
        );
        assert_eq!(
            encode_message(r#"{"job_id":"J1"}"#, MessageEncoding::None),
            r#"{"job_id":"J1"}"#
        );
    }

    #[test]
    fn test_decode_passes_through_raw_json() {
        let raw = r#"{"job_id": "J1"}"#;
        assert_eq!(decode_message(raw, MessageEncoding::Base64), raw.as_bytes());
    }

    #[test]
    fn test_parse_messages() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<QueueMessagesList>
  <QueueMessage>
    <MessageId>m-1</MessageId>
    <InsertionTime>Fri, 17 Oct 2025 10:00:00 GMT</InsertionTime>
    <PopReceipt>AgAAAA==</PopReceipt>
    <DequeueCount>1</DequeueCount>
    <MessageText>eyJqb2JfaWQiOiJKMSJ9</MessageText>
  </QueueMessage>
  <QueueMessage>
    <MessageId>m-2</MessageId>
    <PopReceipt>BgAAAA==</PopReceipt>
    <DequeueCount>6</DequeueCount>
    <MessageText>{&quot;job_id&quot;: &quot;J2&quot;}</MessageText>
  </QueueMessage>
</QueueMessagesList>"#;

        let messages = parse_messages(xml).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m-1");
        assert_eq!(messages[0].pop_receipt, "AgAAAA==");
        assert_eq!(messages[0].dequeue_count, 1);
        assert_eq!(messages[1].dequeue_count, 6);
        assert_eq!(messages[1].text, r#"{"job_id": "J2"}"#);
    }

    #[test]
    fn test_parse_empty_list() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?><QueueMessagesList />"#;
        assert!(parse_messages(xml).unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_incomplete_message() {
        let xml = "<QueueMessagesList><QueueMessage><MessageId>m</MessageId></QueueMessage></QueueMessagesList>";
        assert!(matches!(parse_messages(xml), Err(StorageError::Decode(_))));
    }

    #[tokio::test]
    async fn test_enqueue_posts_base64_message() {
        let mut server = Server::new_async().await;
        let expected = encode_message(r#"{"job_id":"J1"}"#, MessageEncoding::Base64);
        let mock = server
            .mock("POST", "/acct/notification-queue/messages")
            .match_body(Matcher::Exact(format!(
                "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
                expected
            )))
            .with_status(201)
            .create_async()
            .await;

        let client = client_for(&server, MessageEncoding::Base64);
        client
            .enqueue("notification-queue", &json!({"job_id": "J1"}))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_enqueue_raw_message_is_escaped() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/acct/q/messages")
            .match_body(Matcher::Exact(
                "<QueueMessage><MessageText>{&quot;job_id&quot;:&quot;J1&quot;}</MessageText></QueueMessage>"
                    .to_string(),
            ))
            .with_status(201)
            .create_async()
            .await;

        let client = client_for(&server, MessageEncoding::None);
        client.enqueue("q", &json!({"job_id": "J1"})).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_text_creates_missing_queue() {
        let mut server = Server::new_async().await;
        // Matching mocks are served in creation order until their hit count is met.
        let missing = server
            .mock("POST", "/acct/update-queue-poison/messages")
            .with_status(404)
            .with_body("<Error><Code>QueueNotFound</Code></Error>")
            .expect(1)
            .create_async()
            .await;
        let retry = server
            .mock("POST", "/acct/update-queue-poison/messages")
            .match_body(Matcher::Exact(
                "<QueueMessage><MessageText>abc</MessageText></QueueMessage>".to_string(),
            ))
            .with_status(201)
            .expect(1)
            .create_async()
            .await;
        let create = server
            .mock("PUT", "/acct/update-queue-poison")
            .with_status(201)
            .create_async()
            .await;

        let client = client_for(&server, MessageEncoding::Base64);
        client.send_text("update-queue-poison", "abc").await.unwrap();

        missing.assert_async().await;
        create.assert_async().await;
        retry.assert_async().await;
    }

    #[tokio::test]
    async fn test_receive_sends_batch_parameters() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/acct/update-queue/messages")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("numofmessages".into(), "16".into()),
                Matcher::UrlEncoded("visibilitytimeout".into(), "300".into()),
            ]))
            .with_status(200)
            .with_body(
                "<QueueMessagesList><QueueMessage><MessageId>m-1</MessageId>\
                 <PopReceipt>r1</PopReceipt><DequeueCount>2</DequeueCount>\
                 <MessageText>abc</MessageText></QueueMessage></QueueMessagesList>",
            )
            .create_async()
            .await;

        let client = client_for(&server, MessageEncoding::Base64);
        let messages = client
            .receive("update-queue", 16, Duration::from_secs(300))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            messages,
            vec![QueueMessage {
                id: "m-1".into(),
                pop_receipt: "r1".into(),
                dequeue_count: 2,
                text: "abc".into(),
            }]
        );
    }

    #[tokio::test]
    async fn test_delete_uses_pop_receipt() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/acct/update-queue/messages/m-1")
            .match_query(Matcher::UrlEncoded("popreceipt".into(), "AgAAAA==".into()))
            .with_status(204)
            .create_async()
            .await;

        let client = client_for(&server, MessageEncoding::Base64);
        let message = QueueMessage {
            id: "m-1".into(),
            pop_receipt: "AgAAAA==".into(),
            dequeue_count: 1,
            text: String::new(),
        };
        client.delete("update-queue", &message).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_missing_message_is_ok() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/acct/q/messages/m-9")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server, MessageEncoding::Base64);
        let message = QueueMessage {
            id: "m-9".into(),
            pop_receipt: "r".into(),
            dequeue_count: 1,
            text: String::new(),
        };
        assert!(client.delete("q", &message).await.is_ok());
    }
}
