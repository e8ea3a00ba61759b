//! 磁盘缓存条目编码
//!
//! 格式：一行 JSON 头（key / stored_at / ttl_secs），换行，然后是原始 payload。

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, WttrError};
use crate::utils::elapsed_between;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntryHeader {
    pub key: String,
    pub stored_at: DateTime<Utc>,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl EntryHeader {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_secs {
            Some(ttl) => elapsed_between(self.stored_at, now) >= Duration::from_secs(ttl),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub header: EntryHeader,
    pub value: Bytes,
}

impl CacheEntry {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = serde_json::to_vec(&self.header)?;
        let mut buf = Vec::with_capacity(header.len() + 1 + self.value.len());
        buf.extend_from_slice(&header);
        buf.push(b'\n');
        buf.extend_from_slice(&self.value);
        Ok(buf)
    }

    pub fn decode(raw: Bytes) -> Result<Self> {
        let split = raw
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| WttrError::serialization("cache entry has no header line"))?;

        let header: EntryHeader = serde_json::from_slice(&raw[..split])?;
        let value = raw.slice(split + 1..);
        Ok(Self { header, value })
    }
}
