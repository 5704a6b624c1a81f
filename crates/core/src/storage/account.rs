//! Storage account endpoints and credentials from a connection string.

use std::collections::HashMap;
use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use reqwest::Url;

use super::StorageError;

/// Well-known Azurite development account.
const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";
const DEV_QUEUE_ENDPOINT: &str = "http://127.0.0.1:10001/devstoreaccount1";

/// How requests to the account are authorized.
#[derive(Clone)]
pub enum StorageCredential {
    /// Shared Key signing with the decoded account key.
    SharedKey { account: String, key: Vec<u8> },
    /// Shared access signature appended to every request URL.
    Sas(String),
    /// No authorization (public containers, local emulators).
    Anonymous,
}

impl fmt::Debug for StorageCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .finish_non_exhaustive(),
            Self::Sas(_) => f.write_str("Sas(..)"),
            Self::Anonymous => f.write_str("Anonymous"),
        }
    }
}

/// A storage account: service endpoints plus credential.
#[derive(Debug, Clone)]
pub struct StorageAccount {
    pub blob_endpoint: Url,
    pub queue_endpoint: Url,
    pub credential: StorageCredential,
}

impl StorageAccount {
    /// Parse a `Key=Value;...` storage connection string.
    ///
    /// Supports account name/key with a protocol and endpoint suffix,
    /// explicit `BlobEndpoint`/`QueueEndpoint`, `SharedAccessSignature`,
    /// and `UseDevelopmentStorage=true`.
    pub fn from_connection_string(connection_string: &str) -> Result<Self, StorageError> {
        let settings = parse_settings(connection_string)?;
        let get = |key: &str| settings.get(key).map(String::as_str);

        if get("usedevelopmentstorage").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            return Ok(Self {
                blob_endpoint: parse_url(DEV_BLOB_ENDPOINT)?,
                queue_endpoint: parse_url(DEV_QUEUE_ENDPOINT)?,
                credential: StorageCredential::SharedKey {
                    account: DEV_ACCOUNT_NAME.to_string(),
                    key: decode_key(DEV_ACCOUNT_KEY)?,
                },
            });
        }

        let account_name = get("accountname");
        let protocol = get("defaultendpointsprotocol").unwrap_or("https");
        let suffix = get("endpointsuffix").unwrap_or("core.windows.net");

        let endpoint = |explicit: Option<&str>, service: &str| -> Result<Url, StorageError> {
            match (explicit, account_name) {
                (Some(url), _) => parse_url(url),
                (None, Some(name)) => {
                    parse_url(&format!("{}://{}.{}.{}", protocol, name, service, suffix))
                }
                (None, None) => Err(StorageError::InvalidConnectionString(format!(
                    "no {} endpoint and no AccountName",
                    service
                ))),
            }
        };

        let blob_endpoint = endpoint(get("blobendpoint"), "blob")?;
        let queue_endpoint = endpoint(get("queueendpoint"), "queue")?;

        let credential = match (get("sharedaccesssignature"), account_name, get("accountkey")) {
            (Some(sas), _, _) => StorageCredential::Sas(sas.trim_start_matches('?').to_string()),
            (None, Some(name), Some(key)) => StorageCredential::SharedKey {
                account: name.to_string(),
                key: decode_key(key)?,
            },
            (None, None, Some(_)) => {
                return Err(StorageError::InvalidConnectionString(
                    "AccountKey given without AccountName".to_string(),
                ))
            }
            (None, _, None) => StorageCredential::Anonymous,
        };

        Ok(Self {
            blob_endpoint,
            queue_endpoint,
            credential,
        })
    }
}

fn parse_settings(connection_string: &str) -> Result<HashMap<String, String>, StorageError> {
    let mut settings = HashMap::new();
    for part in connection_string.split(';').map(str::trim) {
        if part.is_empty() {
            continue;
        }
        // Values (keys, signatures) may themselves contain '='.
        let (key, value) = part.split_once('=').ok_or_else(|| {
            StorageError::InvalidConnectionString(format!("malformed setting '{}'", part))
        })?;
        settings.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    if settings.is_empty() {
        return Err(StorageError::InvalidConnectionString(
            "connection string is empty".to_string(),
        ));
    }
    Ok(settings)
}

fn parse_url(raw: &str) -> Result<Url, StorageError> {
    Url::parse(raw.trim_end_matches('/'))
        .map_err(|e| StorageError::InvalidConnectionString(format!("bad endpoint '{}': {}", raw, e)))
}

fn decode_key(key: &str) -> Result<Vec<u8>, StorageError> {
    general_purpose::STANDARD
        .decode(key)
        .map_err(|e| StorageError::InvalidConnectionString(format!("AccountKey is not base64: {}", e)))
}
