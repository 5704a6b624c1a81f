//! Authenticated HTTP transport shared by the blob and queue clients.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Response, StatusCode, Url};
use ring::hmac;
use tracing::debug;
use uuid::Uuid;

use super::{StorageAccount, StorageCredential, StorageError};

/// Storage REST API version sent with every request.
pub(crate) const STORAGE_API_VERSION: &str = "2021-08-06";

/// Request body with its content type.
pub(crate) struct Body {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

#[derive(Debug, Clone)]
pub(crate) struct StorageTransport {
    client: Client,
    account: StorageAccount,
}

impl StorageTransport {
    pub(crate) fn new(account: StorageAccount, timeout: Duration) -> Result<Self, StorageError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, account })
    }

    pub(crate) fn account(&self) -> &StorageAccount {
        &self.account
    }

    /// Send a request with the standard `x-ms-*` headers and authorization.
    pub(crate) async fn send(
        &self,
        method: Method,
        mut url: Url,
        extra_headers: &[(&'static str, &str)],
        body: Option<Body>,
    ) -> Result<Response, StorageError> {
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-date", header_value(&rfc1123_now())?);
        headers.insert("x-ms-version", HeaderValue::from_static(STORAGE_API_VERSION));
        headers.insert(
            "x-ms-client-request-id",
            header_value(&Uuid::new_v4().to_string())?,
        );
        for (name, value) in extra_headers {
            headers.insert(HeaderName::from_static(*name), header_value(value)?);
        }

        let content_length = body.as_ref().map(|b| b.bytes.len()).unwrap_or(0);
        if let Some(body) = &body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(body.content_type));
        }

        match &self.account.credential {
            StorageCredential::SharedKey { account, key } => {
                let to_sign = string_to_sign(&method, &url, &headers, content_length, account);
                let signature = sign(key, &to_sign);
                headers.insert(
                    AUTHORIZATION,
                    header_value(&format!("SharedKey {}:{}", account, signature))?,
                );
            }
            StorageCredential::Sas(token) => append_query(&mut url, token),
            StorageCredential::Anonymous => {}
        }

        debug!("Storage request: {} {}", method, url.path());

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body.bytes);
        }
        Ok(request.send().await?)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, StorageError> {
    HeaderValue::from_str(value)
        .map_err(|e| StorageError::InvalidRequest(format!("invalid header value: {}", e)))
}

fn rfc1123_now() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn append_query(url: &mut Url, extra: &str) {
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, extra),
        _ => extra.to_string(),
    };
    url.set_query(Some(&query));
}

/// Build the Shared Key string-to-sign for the Blob and Queue services.
pub(crate) fn string_to_sign(
    method: &Method,
    url: &Url,
    headers: &HeaderMap,
    content_length: usize,
    account: &str,
) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    };
    let content_length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };

    let mut ms_headers: Vec<(&str, &str)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("").trim()))
        .collect();
    ms_headers.sort();

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }

    let mut out = [
        method.as_str(),
        header("content-encoding"),
        header("content-language"),
        content_length.as_str(),
        header("content-md5"),
        header("content-type"),
        header("date"),
        header("if-modified-since"),
        header("if-match"),
        header("if-none-match"),
        header("if-unmodified-since"),
        header("range"),
    ]
    .join("\n");
    out.push('\n');

    for (name, value) in ms_headers {
        out.push_str(&format!("{}:{}\n", name, value));
    }

    out.push_str(&format!("/{}{}", account, url.path()));
    for (name, mut values) in params {
        values.sort();
        out.push_str(&format!("\n{}:{}", name, values.join(",")));
    }
    out
}

/// Base64 HMAC-SHA256 of `payload` under the account key.
pub(crate) fn sign(key: &[u8], payload: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&key, payload.as_bytes());
    general_purpose::STANDARD.encode(tag.as_ref())
}

/// Turn a non-success response into a [`StorageError`].
pub(crate) async fn error_from_response(response: Response, resource: &str) -> StorageError {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return StorageError::NotFound(resource.to_string());
    }
    let body = response.text().await.unwrap_or_default();
    let message = match (xml_tag(&body, "Code"), xml_tag(&body, "Message")) {
        (Some(code), Some(message)) => format!("{}: {}", code, xml_unescape(message).trim()),
        (Some(code), None) => code.to_string(),
        _ => body,
    };
    StorageError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Text content of the first `<tag>...</tag>` in `xml`.
pub(crate) fn xml_tag<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(&xml[start..end])
}

pub(crate) fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub(crate) fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_sign_layout() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ms-version", HeaderValue::from_static("2021-08-06"));
        headers.insert(
            "x-ms-date",
            HeaderValue::from_static("Fri, 17 Oct 2025 10:00:00 GMT"),
        );
        headers.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let url = Url::parse("https://acct.blob.core.windows.net/reports/J1.json").unwrap();
        let to_sign = string_to_sign(&Method::PUT, &url, &headers, 42, "acct");

        let expected = "PUT\n\n\n42\n\napplication/json\n\n\n\n\n\n\n\
            x-ms-blob-type:BlockBlob\n\
            x-ms-date:Fri, 17 Oct 2025 10:00:00 GMT\n\
            x-ms-version:2021-08-06\n\
            /acct/reports/J1.json";
        assert_eq!(to_sign, expected);
    }

    #[test]
    fn test_string_to_sign_canonicalizes_query() {
        let headers = HeaderMap::new();
        let url = Url::parse(
            "http://127.0.0.1:10001/devstoreaccount1/q/messages?visibilitytimeout=30&numofmessages=4",
        )
        .unwrap();
        let to_sign = string_to_sign(&Method::GET, &url, &headers, 0, "devstoreaccount1");

        assert!(to_sign.starts_with("GET\n\n\n\n"));
        assert!(to_sign.ends_with(
            "/devstoreaccount1/devstoreaccount1/q/messages\nnumofmessages:4\nvisibilitytimeout:30"
        ));
    }

    #[test]
    fn test_sign_is_base64_hmac_sha256() {
        // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
        let signature = sign(b"key", "The quick brown fox jumps over the lazy dog");
        let raw = general_purpose::STANDARD.decode(signature).unwrap();
        let hex: String = raw.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(
            hex,
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_append_query() {
        let mut url = Url::parse("https://a.blob.core.windows.net/c/k").unwrap();
        append_query(&mut url, "sv=1&sig=x");
        assert_eq!(url.query(), Some("sv=1&sig=x"));

        let mut url = Url::parse("https://a.queue.core.windows.net/q/messages?numofmessages=1")
            .unwrap();
        append_query(&mut url, "sv=1");
        assert_eq!(url.query(), Some("numofmessages=1&sv=1"));
    }

    #[test]
    fn test_xml_helpers() {
        let xml = "<Error><Code>BlobNotFound</Code><Message>The specified blob does not exist.</Message></Error>";
        assert_eq!(xml_tag(xml, "Code"), Some("BlobNotFound"));
        assert_eq!(xml_tag(xml, "Missing"), None);

        let raw = r#"{"a":"<b> & 'c'"}"#;
        assert_eq!(xml_unescape(&xml_escape(raw)), raw);
    }
}
