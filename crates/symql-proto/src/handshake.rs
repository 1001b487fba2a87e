//! Engine greeting sent once when a backend process starts.

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

use crate::message::align;
use crate::Error;

/// First frame an engine writes after it has opened its database.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version the engine speaks.
    pub protocol_version: u32,
    /// Engine name (e.g. "sqlite").
    pub engine: String,
    /// Engine library version.
    pub engine_version: String,
    /// Error message if the engine could not open its database.
    pub error: Option<String>,
}

impl Hello {
    /// Create a greeting for a ready engine.
    pub fn ready(engine: impl Into<String>, engine_version: impl Into<String>) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            engine: engine.into(),
            engine_version: engine_version.into(),
            error: None,
        }
    }

    /// Create a greeting for an engine that failed to start.
    pub fn failed(engine: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
            engine: engine.into(),
            engine_version: String::new(),
            error: Some(error.into()),
        }
    }

    /// Check the greeting against this crate's protocol version.
    pub fn check(&self) -> Result<(), Error> {
        if self.protocol_version != crate::PROTOCOL_VERSION {
            return Err(Error::VersionMismatch {
                expected: crate::PROTOCOL_VERSION,
                actual: self.protocol_version,
            });
        }
        Ok(())
    }
}

/// Serialize a greeting payload.
pub fn encode_hello(hello: &Hello) -> Result<AlignedVec, Error> {
    rkyv::to_bytes::<rkyv::rancor::Error>(hello)
        .map_err(|e| Error::Serialization(format!("failed to serialize hello: {}", e)))
}

/// Deserialize a greeting payload.
pub fn decode_hello(payload: &[u8]) -> Result<Hello, Error> {
    let aligned = align(payload);
    let archived = rkyv::access::<ArchivedHello, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::InvalidMessage(format!("failed to access hello: {}", e)))?;
    rkyv::deserialize::<Hello, rkyv::rancor::Error>(archived)
        .map_err(|e| Error::Deserialization(format!("failed to deserialize hello: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_roundtrip() {
        let hello = Hello::ready("sqlite", "3.46.0");
        let bytes = encode_hello(&hello).unwrap();
        let decoded = decode_hello(&bytes).unwrap();
        assert_eq!(decoded, hello);
        assert!(decoded.check().is_ok());
    }

    #[test]
    fn test_version_mismatch() {
        let mut hello = Hello::ready("sqlite", "3.46.0");
        hello.protocol_version = crate::PROTOCOL_VERSION + 1;
        assert!(matches!(
            hello.check(),
            Err(Error::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_failed_hello() {
        let hello = Hello::failed("sqlite", "unable to open database file");
        let decoded = decode_hello(&encode_hello(&hello).unwrap()).unwrap();
        assert_eq!(decoded.error.as_deref(), Some("unable to open database file"));
    }
}
