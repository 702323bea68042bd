//! Wire framing for on-disk buffering. Data points use a fixed binary
//! layout (no serde, since the value union needs an explicit tag byte);
//! every other buffered type uses a length-prefixed JSON frame.

use ingest_core::identity::Identity;
use ingest_core::model::{DataPoint, DataPointValue};
use ingest_core::IngestError;

/// One series' worth of data points, as framed on disk (§6, little-endian
/// throughout): `u8 idKind (1=internal,2=external); (u64 internalId | u32
/// len + utf8 externalId); u32 count; count * (i64 tsMillis, u8 valueKind
/// (1=num,2=str), f64 | (u32 len + utf8))`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPointBatch {
    pub identity: Identity,
    pub points: Vec<DataPoint>,
}

const ID_KIND_INTERNAL: u8 = 1;
const ID_KIND_EXTERNAL: u8 = 2;
const VALUE_KIND_NUMERIC: u8 = 1;
const VALUE_KIND_STRING: u8 = 2;

pub fn encode_data_point_batch(batch: &DataPointBatch, out: &mut Vec<u8>) {
    match &batch.identity {
        Identity::Internal(id) => {
            out.push(ID_KIND_INTERNAL);
            out.extend_from_slice(&(*id as u64).to_le_bytes());
        }
        Identity::External(external_id) => {
            out.push(ID_KIND_EXTERNAL);
            let bytes = external_id.as_bytes();
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(bytes);
        }
    }
    out.extend_from_slice(&(batch.points.len() as u32).to_le_bytes());
    for point in &batch.points {
        out.extend_from_slice(&point.timestamp.to_le_bytes());
        match &point.value {
            DataPointValue::Numeric(n) => {
                out.push(VALUE_KIND_NUMERIC);
                out.extend_from_slice(&n.to_le_bytes());
            }
            DataPointValue::String(s) => {
                out.push(VALUE_KIND_STRING);
                let bytes = s.as_bytes();
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
        }
    }
}

pub fn decode_data_point_batch(buf: &[u8], cursor: &mut usize) -> Result<DataPointBatch, IngestError> {
    let id_kind = read_u8(buf, cursor)?;
    let identity = match id_kind {
        ID_KIND_INTERNAL => Identity::Internal(read_u64(buf, cursor)? as i64),
        ID_KIND_EXTERNAL => {
            let len = read_u32(buf, cursor)? as usize;
            let bytes = read_bytes(buf, cursor, len)?;
            Identity::External(
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| IngestError::MalformedFrame(e.to_string()))?,
            )
        }
        other => return Err(IngestError::MalformedFrame(format!("unknown id kind {other}"))),
    };

    let count = read_u32(buf, cursor)? as usize;
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        let timestamp = read_i64(buf, cursor)?;
        let value_kind = read_u8(buf, cursor)?;
        let value = match value_kind {
            VALUE_KIND_NUMERIC => DataPointValue::Numeric(read_f64(buf, cursor)?),
            VALUE_KIND_STRING => {
                let len = read_u32(buf, cursor)? as usize;
                let bytes = read_bytes(buf, cursor, len)?;
                DataPointValue::String(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|e| IngestError::MalformedFrame(e.to_string()))?,
                )
            }
            other => return Err(IngestError::MalformedFrame(format!("unknown value kind {other}"))),
        };
        points.push(DataPoint { timestamp, value });
    }

    Ok(DataPointBatch { identity, points })
}

/// Encodes `item` as a `u32` length prefix followed by its JSON body.
pub fn encode_json_frame<T: serde::Serialize>(item: &T, out: &mut Vec<u8>) -> Result<(), IngestError> {
    let bytes = serde_json::to_vec(item).map_err(|e| IngestError::MalformedFrame(e.to_string()))?;
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&bytes);
    Ok(())
}

pub fn decode_json_frame<T: serde::de::DeserializeOwned>(
    buf: &[u8],
    cursor: &mut usize,
) -> Result<T, IngestError> {
    let len = read_u32(buf, cursor)? as usize;
    let bytes = read_bytes(buf, cursor, len)?;
    serde_json::from_slice(bytes).map_err(|e| IngestError::MalformedFrame(e.to_string()))
}

fn read_bytes<'a>(buf: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8], IngestError> {
    let end = cursor
        .checked_add(len)
        .filter(|end| *end <= buf.len())
        .ok_or_else(|| IngestError::MalformedFrame("frame truncated".into()))?;
    let slice = &buf[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn read_u8(buf: &[u8], cursor: &mut usize) -> Result<u8, IngestError> {
    Ok(read_bytes(buf, cursor, 1)?[0])
}

fn read_u32(buf: &[u8], cursor: &mut usize) -> Result<u32, IngestError> {
    let bytes = read_bytes(buf, cursor, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u64(buf: &[u8], cursor: &mut usize) -> Result<u64, IngestError> {
    let bytes = read_bytes(buf, cursor, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_i64(buf: &[u8], cursor: &mut usize) -> Result<i64, IngestError> {
    let bytes = read_bytes(buf, cursor, 8)?;
    Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_f64(buf: &[u8], cursor: &mut usize) -> Result<f64, IngestError> {
    let bytes = read_bytes(buf, cursor, 8)?;
    Ok(f64::from_le_bytes(bytes.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_the_pinned_little_endian_wire_layout() {
        let batch = DataPointBatch {
            identity: Identity::Internal(1),
            points: vec![DataPoint { timestamp: 1, value: DataPointValue::Numeric(1.0) }],
        };
        let mut buf = Vec::new();
        encode_data_point_batch(&batch, &mut buf);

        let mut expected = vec![1u8]; // idKind = internal
        expected.extend_from_slice(&1u64.to_le_bytes()); // internal id
        expected.extend_from_slice(&1u32.to_le_bytes()); // count
        expected.extend_from_slice(&1i64.to_le_bytes()); // timestamp
        expected.push(1u8); // valueKind = numeric
        expected.extend_from_slice(&1.0f64.to_le_bytes());
        assert_eq!(buf, expected);

        let external = DataPointBatch {
            identity: Identity::External("a".into()),
            points: vec![DataPoint { timestamp: 2, value: DataPointValue::String("x".into()) }],
        };
        let mut buf = Vec::new();
        encode_data_point_batch(&external, &mut buf);

        let mut expected = vec![2u8]; // idKind = external
        expected.extend_from_slice(&1u32.to_le_bytes()); // externalId byte length
        expected.extend_from_slice(b"a");
        expected.extend_from_slice(&1u32.to_le_bytes()); // count
        expected.extend_from_slice(&2i64.to_le_bytes()); // timestamp
        expected.push(2u8); // valueKind = string
        expected.extend_from_slice(&1u32.to_le_bytes()); // value byte length
        expected.extend_from_slice(b"x");
        assert_eq!(buf, expected);
    }

    #[test]
    fn round_trips_a_batch_with_mixed_internal_and_external_identity() {
        for identity in [Identity::Internal(7), Identity::External("abc".into())] {
            let batch = DataPointBatch {
                identity,
                points: vec![
                    DataPoint { timestamp: 100, value: DataPointValue::Numeric(1.5) },
                    DataPoint { timestamp: 200, value: DataPointValue::String("ok".into()) },
                ],
            };
            let mut buf = Vec::new();
            encode_data_point_batch(&batch, &mut buf);
            let mut cursor = 0;
            let decoded = decode_data_point_batch(&buf, &mut cursor).unwrap();
            assert_eq!(decoded, batch);
            assert_eq!(cursor, buf.len());
        }
    }

    #[test]
    fn rejects_a_truncated_frame() {
        let batch = DataPointBatch {
            identity: Identity::Internal(1),
            points: vec![DataPoint { timestamp: 1, value: DataPointValue::Numeric(1.0) }],
        };
        let mut buf = Vec::new();
        encode_data_point_batch(&batch, &mut buf);
        buf.truncate(buf.len() - 2);
        let mut cursor = 0;
        assert!(decode_data_point_batch(&buf, &mut cursor).is_err());
    }

    #[test]
    fn json_frames_round_trip() {
        let mut buf = Vec::new();
        encode_json_frame(&vec!["a".to_string(), "b".to_string()], &mut buf).unwrap();
        let mut cursor = 0;
        let decoded: Vec<String> = decode_json_frame(&buf, &mut cursor).unwrap();
        assert_eq!(decoded, vec!["a".to_string(), "b".to_string()]);
    }
}
