//! Wire protocol between the host and the provider server.
//!
//! Every message is a JSON document preceded by its length as a 4-byte
//! big-endian integer. A connection carries any number of request/response
//! pairs, one at a time, until the host closes it.

use crate::schema::{Diagnostic, ProviderSchema};
use crate::types::{ImportedResource, PlanResult, ProviderMetadata};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame body.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Time allowed for writing one response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Framing and encoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The body was not valid JSON for the expected message.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The length prefix exceeds [`MAX_MESSAGE_SIZE`].
    #[error("Message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Announced size.
        size: usize,
        /// Limit.
        max: usize,
    },

    /// The peer closed the connection between messages.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The operation did not finish in time.
    #[error("Timeout")]
    Timeout,
}

/// A host request. One variant per [`ProviderService`](crate::ProviderService) operation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    GetMetadata,
    GetSchema,
    ValidateProviderConfig {
        config: Value,
    },
    Configure {
        config: Value,
    },
    Stop,
    ValidateResourceConfig {
        resource_type: String,
        config: Value,
    },
    UpgradeResourceState {
        resource_type: String,
        version: u64,
        state: Value,
    },
    Plan {
        resource_type: String,
        #[serde(default)]
        prior_state: Option<Value>,
        proposed_state: Value,
        #[serde(default)]
        config: Value,
    },
    Create {
        resource_type: String,
        planned_state: Value,
    },
    Read {
        resource_type: String,
        current_state: Value,
    },
    Update {
        resource_type: String,
        prior_state: Value,
        planned_state: Value,
    },
    Delete {
        resource_type: String,
        current_state: Value,
    },
    ImportResource {
        resource_type: String,
        id: String,
    },
    ValidateDataSourceConfig {
        data_source_type: String,
        config: Value,
    },
    ReadDataSource {
        data_source_type: String,
        config: Value,
    },
}

/// The provider's answer to a [`Request`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Metadata {
        metadata: ProviderMetadata,
    },
    Schema {
        schema: ProviderSchema,
    },
    /// Result of validation, configure and delete.
    Diagnostics {
        diagnostics: Vec<Diagnostic>,
    },
    Stopped,
    Plan {
        plan: PlanResult,
    },
    /// Result of create, read, update, state upgrade and data source reads.
    /// `diagnostics` carries warnings, currently only from update.
    State {
        state: Value,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        diagnostics: Vec<Diagnostic>,
    },
    Imported {
        resources: Vec<ImportedResource>,
    },
    /// The operation failed; nothing was produced.
    Error {
        diagnostics: Vec<Diagnostic>,
    },
}

/// Serialize a message body without the length prefix.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

/// Deserialize a message body.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed frame.
///
/// End of stream before the prefix is [`ProtocolError::ConnectionClosed`];
/// end of stream inside a frame is an I/O error.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }

    let size = u32::from_be_bytes(prefix) as usize;
    if size > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size,
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

/// Write one length-prefixed frame and flush.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
) -> Result<(), ProtocolError> {
    if body.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode the next request on a connection.
pub async fn read_request<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Request, ProtocolError> {
    let body = read_message(reader).await?;
    decode(&body)
}

/// Encode and write a response, bounded by `timeout`.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let body = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &body))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_is_tagged_by_type() {
        let request: Request = decode(
            br#"{"type":"create","resource_type":"circleci_context","planned_state":{"name":"deploy"}}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            Request::Create {
                resource_type: "circleci_context".to_string(),
                planned_state: json!({"name": "deploy"}),
            }
        );

        let encoded = encode(&Request::GetSchema).unwrap();
        assert_eq!(encoded, br#"{"type":"get_schema"}"#);
    }

    #[test]
    fn test_plan_defaults_optional_fields() {
        let request: Request =
            decode(br#"{"type":"plan","resource_type":"circleci_runner","proposed_state":{}}"#).unwrap();
        match request {
            Request::Plan {
                prior_state,
                config,
                ..
            } => {
                assert!(prior_state.is_none());
                assert!(config.is_null());
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_frame_has_big_endian_length_prefix() {
        let mut buffer = Vec::new();
        write_message(&mut buffer, b"{}").await.unwrap();
        assert_eq!(buffer, vec![0, 0, 0, 2, b'{', b'}']);

        let mut cursor = std::io::Cursor::new(buffer);
        assert_eq!(read_message(&mut cursor).await.unwrap(), b"{}");
        assert!(matches!(
            read_message(&mut cursor).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let prefix = ((MAX_MESSAGE_SIZE + 1) as u32).to_be_bytes();
        let mut cursor = std::io::Cursor::new(prefix.to_vec());
        assert!(matches!(
            read_message(&mut cursor).await,
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let body = br#"{"type":"stop"}"#;
        let prefix = (body.len() as u32).to_be_bytes();
        let mut reader = tokio_test::io::Builder::new()
            .read(&prefix[..2])
            .read(&prefix[2..])
            .read(&body[..5])
            .read(&body[5..])
            .build();
        assert_eq!(read_request(&mut reader).await.unwrap(), Request::Stop);
    }

    #[tokio::test]
    async fn test_response_write_is_one_frame() {
        let body = encode(&Response::Stopped).unwrap();
        let prefix = (body.len() as u32).to_be_bytes();
        let mut writer = tokio_test::io::Builder::new()
            .write(&prefix)
            .write(&body)
            .build();
        write_response(&mut writer, &Response::Stopped, DEFAULT_TIMEOUT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_truncated_frame_is_io_error() {
        let mut cursor = std::io::Cursor::new(vec![0, 0, 0, 10, b'{']);
        assert!(matches!(read_message(&mut cursor).await, Err(ProtocolError::Io(_))));
    }
}
