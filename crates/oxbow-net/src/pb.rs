//! The push-log wire body.

use cid::Cid;
use oxbow_db::Update;
use oxbow_types::{DocId, SchemaRoot};
use prost::Message;

use crate::error::{NetError, NetResult};

/// A pushed log record: one delta block plus its addressing metadata.
///
/// Serialized with prost; the surrounding RPC service and codec are
/// negotiated externally.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushLogRequest {
    #[prost(string, tag = "1")]
    pub doc_key: String,
    /// Binary CID of the block.
    #[prost(bytes = "vec", tag = "2")]
    pub cid: Vec<u8>,
    #[prost(string, tag = "3")]
    pub schema_root: String,
    /// The dag-pb block bytes.
    #[prost(bytes = "vec", tag = "4")]
    pub block: Vec<u8>,
    #[prost(uint64, tag = "5")]
    pub priority: u64,
}

impl PushLogRequest {
    pub fn from_update(update: &Update) -> Self {
        Self {
            doc_key: update.doc_id.as_str().to_string(),
            cid: update.cid.to_bytes(),
            schema_root: update.schema_root.as_str().to_string(),
            block: update.block.clone(),
            priority: update.priority,
        }
    }

    /// Decode and validate the addressing fields.
    pub fn parts(&self) -> NetResult<(DocId, SchemaRoot, Cid)> {
        let doc_id = DocId::parse(&self.doc_key)
            .map_err(|e| NetError::InvalidRequest(e.to_string()))?;
        let cid = Cid::try_from(self.cid.as_slice())
            .map_err(|e| NetError::InvalidRequest(e.to_string()))?;
        if self.schema_root.is_empty() {
            return Err(NetError::InvalidRequest("empty schema root".to_string()));
        }
        Ok((doc_id, SchemaRoot(self.schema_root.clone()), cid))
    }

    pub fn encode_to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    pub fn decode_from_bytes(bytes: &[u8]) -> NetResult<Self> {
        Self::decode(bytes).map_err(|e| NetError::InvalidRequest(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::new_cid_dagpb;

    fn update() -> Update {
        Update {
            doc_id: DocId::generate(b"pb tests", &SchemaRoot("root".to_string())),
            cid: new_cid_dagpb(b"block"),
            schema_root: SchemaRoot("root".to_string()),
            block: b"block bytes".to_vec(),
            priority: 2,
        }
    }

    #[test]
    fn wire_roundtrip() {
        let request = PushLogRequest::from_update(&update());
        let decoded = PushLogRequest::decode_from_bytes(&request.encode_to_bytes()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn parts_validate_addressing() {
        let request = PushLogRequest::from_update(&update());
        let (doc_id, schema_root, cid) = request.parts().unwrap();
        assert_eq!(doc_id.as_str(), request.doc_key);
        assert_eq!(schema_root.as_str(), "root");
        assert_eq!(cid.to_bytes(), request.cid);
    }

    #[test]
    fn malformed_fields_are_rejected() {
        let mut request = PushLogRequest::from_update(&update());
        request.cid = vec![0x01];
        assert!(matches!(
            request.parts(),
            Err(NetError::InvalidRequest(_))
        ));

        let mut request = PushLogRequest::from_update(&update());
        request.doc_key = "not a cid".to_string();
        assert!(request.parts().is_err());
    }
}
