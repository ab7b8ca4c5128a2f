use bytes::{Buf, BufMut, Bytes, BytesMut};
use models::{Fingerprint, Labels, TimeRange, Timestamp};
use snafu::ensure;

use crate::error::{
    ChecksumMismatchSnafu, ChunkNotEncodedSnafu, CommonSnafu, DecodeChunkSnafu,
    InvalidExternalKeySnafu, NoDataInSliceRangeSnafu, Result,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// The decompressed sample payload of one chunk, sorted by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkData {
    samples: Vec<Sample>,
}

impl ChunkData {
    pub fn new(mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Covered interval, None when there are no samples.
    pub fn span(&self) -> Option<TimeRange> {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => Some(TimeRange::new(first.timestamp, last.timestamp)),
            _ => None,
        }
    }

    fn restricted_to(&self, range: &TimeRange) -> ChunkData {
        ChunkData {
            samples: self
                .samples
                .iter()
                .filter(|s| range.contains(s.timestamp))
                .copied()
                .collect(),
        }
    }
}

/// One compressed time-series segment for a single series over an interval.
///
/// The encoded form is the snappy-compressed header + samples followed by a
/// little-endian crc32 of the compressed body. The crc doubles as the
/// checksum in the external key, so re-encoding the same logical chunk
/// yields the same key.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub user_id: String,
    pub fingerprint: Fingerprint,
    pub metric: Labels,
    pub time_range: TimeRange,
    pub checksum: u32,
    data: Option<ChunkData>,
    encoded: Option<Bytes>,
}

impl Chunk {
    pub fn new(user_id: impl Into<String>, metric: Labels, data: ChunkData) -> Result<Chunk> {
        let time_range = data.span().ok_or_else(|| {
            CommonSnafu {
                reason: "chunk has no samples".to_string(),
            }
            .build()
        })?;
        Ok(Chunk {
            user_id: user_id.into(),
            fingerprint: metric.fingerprint(),
            metric,
            time_range,
            checksum: 0,
            data: Some(data),
            encoded: None,
        })
    }

    pub fn from(&self) -> Timestamp {
        self.time_range.min_ts
    }

    pub fn through(&self) -> Timestamp {
        self.time_range.max_ts
    }

    pub fn data(&self) -> Option<&ChunkData> {
        self.data.as_ref()
    }

    /// The globally unique storage key. A pure function of tenant,
    /// fingerprint, interval and checksum.
    pub fn external_key(&self) -> String {
        format!(
            "{}/{:x}:{:x}:{:x}:{:x}",
            self.user_id, self.fingerprint, self.time_range.min_ts, self.time_range.max_ts,
            self.checksum
        )
    }

    /// Reconstructs a data-less chunk from its external key. The key must
    /// belong to `user_id`.
    pub fn parse_external_key(user_id: &str, key: &str) -> Result<Chunk> {
        let invalid = || InvalidExternalKeySnafu { key }.build();

        let (key_user, rest) = key.split_once('/').ok_or_else(invalid)?;
        ensure!(key_user == user_id, InvalidExternalKeySnafu { key });

        let mut parts = rest.split(':');
        let mut next_hex = || -> Result<u64> {
            parts
                .next()
                .and_then(|p| u64::from_str_radix(p, 16).ok())
                .ok_or_else(invalid)
        };
        let fingerprint = next_hex()?;
        let from = next_hex()? as i64;
        let through = next_hex()? as i64;
        let checksum = next_hex()? as u32;
        ensure!(parts.next().is_none(), InvalidExternalKeySnafu { key });

        Ok(Chunk {
            user_id: user_id.to_string(),
            fingerprint,
            metric: Labels::default(),
            time_range: TimeRange::new(from, through),
            checksum,
            data: None,
            encoded: None,
        })
    }

    /// Serializes the chunk, fixing `checksum` and the cached encoded form.
    pub fn encode(&mut self) -> Result<Bytes> {
        let data = self.data.as_ref().ok_or_else(|| {
            CommonSnafu {
                reason: "cannot encode a chunk without data".to_string(),
            }
            .build()
        })?;

        let mut raw = BytesMut::new();
        raw.put_u16(self.user_id.len() as u16);
        raw.put_slice(self.user_id.as_bytes());
        raw.put_u16(self.metric.len() as u16);
        for label in &self.metric {
            raw.put_u16(label.name.len() as u16);
            raw.put_slice(label.name.as_bytes());
            raw.put_u16(label.value.len() as u16);
            raw.put_slice(label.value.as_bytes());
        }
        raw.put_i64(self.time_range.min_ts);
        raw.put_i64(self.time_range.max_ts);
        raw.put_u32(data.len() as u32);
        for sample in data.samples() {
            raw.put_i64(sample.timestamp);
            raw.put_u64(sample.value.to_bits());
        }

        let compressed = snap::raw::Encoder::new()
            .compress_vec(&raw)
            .map_err(|e| {
                CommonSnafu {
                    reason: format!("snappy compression failed: {}", e),
                }
                .build()
            })?;
        let crc = crc32fast::hash(&compressed);

        let mut buf = BytesMut::with_capacity(compressed.len() + 4);
        buf.put_slice(&compressed);
        buf.put_u32_le(crc);
        let buf = buf.freeze();

        self.checksum = crc;
        self.encoded = Some(buf.clone());
        Ok(buf)
    }

    /// The serialized payload; `encode` or `decode` must have run first.
    pub fn encoded_bytes(&self) -> Result<Bytes> {
        self.encoded.clone().ok_or_else(|| ChunkNotEncodedSnafu.build())
    }

    /// Parses an encoded chunk, verifying the trailing crc.
    pub fn decode(buf: &[u8]) -> Result<Chunk> {
        let truncated = |reason: &str| DecodeChunkSnafu { reason }.build();

        if buf.len() < 4 {
            return Err(truncated("buffer shorter than checksum"));
        }
        let (compressed, crc_bytes) = buf.split_at(buf.len() - 4);
        let expected = u32::from_le_bytes(crc_bytes.try_into().unwrap());
        let actual = crc32fast::hash(compressed);
        ensure!(actual == expected, ChecksumMismatchSnafu { expected, actual });

        let raw = snap::raw::Decoder::new()
            .decompress_vec(compressed)
            .map_err(|e| truncated(&format!("snappy decompression failed: {}", e)))?;
        let mut cursor = &raw[..];

        let read_str = |cursor: &mut &[u8]| -> Result<String> {
            if cursor.remaining() < 2 {
                return Err(truncated("missing string length"));
            }
            let len = cursor.get_u16() as usize;
            if cursor.remaining() < len {
                return Err(truncated("string shorter than its length"));
            }
            let s = String::from_utf8(cursor[..len].to_vec())
                .map_err(|_| truncated("string is not utf-8"))?;
            cursor.advance(len);
            Ok(s)
        };

        let user_id = read_str(&mut cursor)?;
        if cursor.remaining() < 2 {
            return Err(truncated("missing label count"));
        }
        let n_labels = cursor.get_u16() as usize;
        let mut pairs = Vec::with_capacity(n_labels);
        for _ in 0..n_labels {
            let name = read_str(&mut cursor)?;
            let value = read_str(&mut cursor)?;
            pairs.push((name, value));
        }
        let metric = Labels::from_pairs(pairs);

        if cursor.remaining() < 8 + 8 + 4 {
            return Err(truncated("missing interval or sample count"));
        }
        let min_ts = cursor.get_i64();
        let max_ts = cursor.get_i64();
        let n_samples = cursor.get_u32() as usize;
        if cursor.remaining() < n_samples * 16 {
            return Err(truncated("sample payload shorter than sample count"));
        }
        let mut samples = Vec::with_capacity(n_samples);
        for _ in 0..n_samples {
            let timestamp = cursor.get_i64();
            let value = f64::from_bits(cursor.get_u64());
            samples.push(Sample { timestamp, value });
        }

        Ok(Chunk {
            fingerprint: metric.fingerprint(),
            user_id,
            metric,
            time_range: TimeRange::new(min_ts, max_ts),
            checksum: expected,
            data: Some(ChunkData::new(samples)),
            encoded: Some(Bytes::copy_from_slice(buf)),
        })
    }

    /// A new, unencoded chunk holding only the samples inside `range`, with
    /// `range` as its interval. `NoDataInSliceRange` when nothing remains.
    pub fn slice(&self, range: TimeRange) -> Result<Chunk> {
        let data = self.data.as_ref().ok_or_else(|| {
            CommonSnafu {
                reason: "cannot slice a chunk without data".to_string(),
            }
            .build()
        })?;

        let restricted = data.restricted_to(&range);
        ensure!(!restricted.is_empty(), NoDataInSliceRangeSnafu);

        Ok(Chunk {
            user_id: self.user_id.clone(),
            fingerprint: self.fingerprint,
            metric: self.metric.clone(),
            time_range: range,
            checksum: 0,
            data: Some(restricted),
            encoded: None,
        })
    }

    /// Moves the payload of `other` into this chunk. Used when merging a
    /// fetched payload into a chunk reference coming from the index.
    pub fn fill_from(&mut self, other: Chunk) {
        self.metric = other.metric;
        self.fingerprint = other.fingerprint;
        self.data = other.data;
        self.encoded = other.encoded;
    }
}

#[cfg(test)]
mod tests {
    use models::{Labels, TimeRange};

    use super::*;

    fn test_chunk() -> Chunk {
        let labels = Labels::from_pairs([("__name__", "http_requests"), ("job", "api")]);
        let data = ChunkData::new(vec![
            Sample::new(1000, 1.0),
            Sample::new(1500, 2.0),
            Sample::new(2000, 3.0),
        ]);
        Chunk::new("7", labels, data).unwrap()
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let mut chunk = test_chunk();
        let buf = chunk.encode().unwrap();
        assert_ne!(chunk.checksum, 0);

        let decoded = Chunk::decode(&buf).unwrap();
        assert_eq!(decoded.user_id, "7");
        assert_eq!(decoded.fingerprint, chunk.fingerprint);
        assert_eq!(decoded.metric, chunk.metric);
        assert_eq!(decoded.time_range, TimeRange::new(1000, 2000));
        assert_eq!(decoded.checksum, chunk.checksum);
        assert_eq!(decoded.data(), chunk.data());
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut chunk = test_chunk();
        let buf = chunk.encode().unwrap();
        let mut corrupted = buf.to_vec();
        corrupted[0] ^= 0xff;
        assert!(matches!(
            Chunk::decode(&corrupted),
            Err(crate::Error::ChecksumMismatch { .. })
        ));
        assert!(Chunk::decode(&[1, 2]).is_err());
    }

    #[test]
    fn test_external_key_round_trip() {
        let mut chunk = test_chunk();
        chunk.encode().unwrap();
        let key = chunk.external_key();

        let parsed = Chunk::parse_external_key("7", &key).unwrap();
        assert_eq!(parsed.fingerprint, chunk.fingerprint);
        assert_eq!(parsed.time_range, chunk.time_range);
        assert_eq!(parsed.checksum, chunk.checksum);
        assert_eq!(parsed.external_key(), key);
    }

    #[test]
    fn test_external_key_is_stable_across_re_encodings() {
        let mut a = test_chunk();
        let mut b = test_chunk();
        a.encode().unwrap();
        b.encode().unwrap();
        assert_eq!(a.external_key(), b.external_key());
    }

    #[test]
    fn test_parse_external_key_rejects_malformed() {
        assert!(Chunk::parse_external_key("7", "no-slash").is_err());
        assert!(Chunk::parse_external_key("7", "8/aa:bb:cc:dd").is_err());
        assert!(Chunk::parse_external_key("7", "7/zz:1:2:3").is_err());
        assert!(Chunk::parse_external_key("7", "7/1:2:3").is_err());
        assert!(Chunk::parse_external_key("7", "7/1:2:3:4:5").is_err());
    }

    #[test]
    fn test_slice() {
        let chunk = test_chunk();

        let left = chunk.slice(TimeRange::new(1000, 1199)).unwrap();
        assert_eq!(left.time_range, TimeRange::new(1000, 1199));
        assert_eq!(left.data().unwrap().len(), 1);

        assert!(matches!(
            chunk.slice(TimeRange::new(1100, 1400)),
            Err(crate::Error::NoDataInSliceRange)
        ));
    }
}
