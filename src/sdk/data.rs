//! Spore and cluster cell data.

use ckb_types::prelude::*;

use crate::chain::codec::{self, MoleculeError};
use crate::chain::types::H256;

/// Data stored in a spore cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SporeData {
    pub content_type: String,
    pub content: Vec<u8>,
    pub cluster_id: Option<H256>,
}

impl SporeData {
    pub fn new(content_type: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            content: content.into(),
            cluster_id: None,
        }
    }

    /// Molecule `SporeData` table: `content_type: Bytes, content: Bytes, cluster_id: BytesOpt`.
    pub fn encode(&self) -> Vec<u8> {
        let content_type = codec::pack_bytes(self.content_type.as_bytes());
        let content = codec::pack_bytes(&self.content);
        let cluster_id = codec::pack_bytes_opt(self.cluster_id.as_ref().map(|id| id.0.as_slice()));
        codec::table(&[content_type.as_slice(), content.as_slice(), cluster_id.as_slice()])
    }

    pub fn decode(data: &[u8]) -> Result<Self, MoleculeError> {
        let fields = codec::table_fields(data, 3)?;
        let cluster_id = match codec::unpack_bytes_opt(fields[2])? {
            Some(raw) => Some(
                H256::from_slice(raw).map_err(|e| MoleculeError::Verification(format!("cluster id: {}", e)))?,
            ),
            None => None,
        };
        Ok(Self {
            content_type: codec::unpack_string(fields[0])?,
            content: codec::unpack_bytes(fields[1])?.to_vec(),
            cluster_id,
        })
    }
}

/// Data stored in a cluster cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterData {
    pub name: String,
    pub description: String,
}

impl ClusterData {
    pub fn encode(&self) -> Vec<u8> {
        let name = codec::pack_bytes(self.name.as_bytes());
        let description = codec::pack_bytes(self.description.as_bytes());
        codec::table(&[name.as_slice(), description.as_slice()])
    }

    pub fn decode(data: &[u8]) -> Result<Self, MoleculeError> {
        let fields = codec::table_fields(data, 2)?;
        Ok(Self {
            name: codec::unpack_string(fields[0])?,
            description: codec::unpack_string(fields[1])?,
        })
    }
}

/// Parsed MIME content type: `type/subtype` plus `;key=value` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub media_type: String,
    pub subtype: String,
    pub params: Vec<(String, String)>,
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"!#$&-^_.+".contains(&b))
}

impl ContentType {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(';');
        let essence = parts.next()?.trim();
        let (media_type, subtype) = essence.split_once('/')?;
        if !is_token(media_type) || !is_token(subtype) {
            return None;
        }
        let mut params = Vec::new();
        for param in parts {
            let (key, value) = param.trim().split_once('=')?;
            if !is_token(key) || value.is_empty() {
                return None;
            }
            params.push((key.to_string(), value.to_string()));
        }
        Some(Self {
            media_type: media_type.to_string(),
            subtype: subtype.to_string(),
            params,
        })
    }
}
