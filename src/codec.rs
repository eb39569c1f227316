//! # Point Codec
//!
//! Wire format for points shipped between the assignment and aggregation
//! stages. All integers and floats are little-endian.
//!
//! ```text
//! Point:        [ tag=0 (u8) | id (u64) | dims (u32) | dims × f64 ]
//! RoutedPoint:  [ tag=1 (u8) | id (u64) | role (u8) | block_key (u64) | dims (u32) | dims × f64 ]
//! ```
//!
//! Feature values are copied bit-for-bit, so `decode(encode(x)) == x` holds
//! for every vector the parser accepts. Vectors longer than `u32::MAX`
//! cannot be framed and fail to encode.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::model::{BlockKey, Point, PointId, Role, RoutedPoint};
use crate::{Error, Result};

const TAG_POINT: u8 = 0;
const TAG_ROUTED: u8 = 1;

const ROLE_ROW: u8 = 0;
const ROLE_COLUMN: u8 = 1;

/// Anything that can be written to the wire.
pub trait Encode {
    /// Append the record to `buf`. On error nothing is written.
    fn encode(&self, buf: &mut BytesMut) -> Result<()>;

    /// Exact number of bytes `encode` appends.
    fn encoded_len(&self) -> usize;

    fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// A decoded record of either kind.
#[derive(Debug, Clone, PartialEq)]
pub enum WireRecord {
    Point(Point),
    Routed(RoutedPoint),
}

impl Encode for Point {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let dims = dimension_count(self.features.len())?;
        buf.put_u8(TAG_POINT);
        buf.put_u64_le(self.id.0);
        encode_features(dims, &self.features, buf);
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        1 + 8 + 4 + 8 * self.features.len()
    }
}

impl Encode for RoutedPoint {
    fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let dims = dimension_count(self.point.features.len())?;
        buf.put_u8(TAG_ROUTED);
        buf.put_u64_le(self.point.id.0);
        buf.put_u8(match self.role {
            Role::Row => ROLE_ROW,
            Role::Column => ROLE_COLUMN,
        });
        buf.put_u64_le(self.block_key.0);
        encode_features(dims, &self.point.features, buf);
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        1 + 8 + 1 + 8 + 4 + 8 * self.point.features.len()
    }
}

/// Feature count as framed on the wire.
fn dimension_count(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| Error::Codec(format!("{len} features exceed the u32 dimension field")))
}

fn encode_features(dims: u32, features: &[f64], buf: &mut BytesMut) {
    buf.put_u32_le(dims);
    for f in features {
        buf.put_f64_le(*f);
    }
}

/// Decode a record of either kind. The buffer must be consumed exactly.
pub fn decode(bytes: &[u8]) -> Result<WireRecord> {
    let mut buf = bytes;
    let tag = take_u8(&mut buf, "tag")?;
    let record = match tag {
        TAG_POINT => {
            let id = PointId(take_u64(&mut buf, "id")?);
            let features = decode_features(&mut buf)?;
            WireRecord::Point(Point { id, features })
        }
        TAG_ROUTED => {
            let id = PointId(take_u64(&mut buf, "id")?);
            let role = match take_u8(&mut buf, "role")? {
                ROLE_ROW => Role::Row,
                ROLE_COLUMN => Role::Column,
                other => return Err(Error::Codec(format!("unknown role byte {other}"))),
            };
            let block_key = BlockKey(take_u64(&mut buf, "block_key")?);
            let features = decode_features(&mut buf)?;
            WireRecord::Routed(RoutedPoint {
                point: Point { id, features },
                role,
                block_key,
            })
        }
        other => return Err(Error::Codec(format!("unknown record tag {other}"))),
    };

    if buf.has_remaining() {
        return Err(Error::Codec(format!("{} trailing bytes after record", buf.remaining())));
    }
    Ok(record)
}

pub fn decode_point(bytes: &[u8]) -> Result<Point> {
    match decode(bytes)? {
        WireRecord::Point(p) => Ok(p),
        WireRecord::Routed(_) => Err(Error::Codec("expected point, found routed point".into())),
    }
}

pub fn decode_routed(bytes: &[u8]) -> Result<RoutedPoint> {
    match decode(bytes)? {
        WireRecord::Routed(r) => Ok(r),
        WireRecord::Point(_) => Err(Error::Codec("expected routed point, found point".into())),
    }
}

fn decode_features(buf: &mut &[u8]) -> Result<Vec<f64>> {
    let dims = take_u32(buf, "dims")? as usize;
    // Check before allocating so a corrupt length cannot reserve gigabytes.
    let needed = dims.checked_mul(8).ok_or_else(|| Error::Codec("feature count overflows".into()))?;
    if buf.remaining() < needed {
        return Err(Error::Codec(format!(
            "buffer too short for {dims} features: need {needed} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok((0..dims).map(|_| buf.get_f64_le()).collect())
}

fn take_u8(buf: &mut &[u8], field: &str) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(truncated(field));
    }
    Ok(buf.get_u8())
}

fn take_u32(buf: &mut &[u8], field: &str) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(truncated(field));
    }
    Ok(buf.get_u32_le())
}

fn take_u64(buf: &mut &[u8], field: &str) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(truncated(field));
    }
    Ok(buf.get_u64_le())
}

fn truncated(field: &str) -> Error {
    Error::Codec(format!("buffer too short for {field}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn point_round_trip() {
        let p = Point::new(42u64, vec![1.5, -0.25, 1e-300]);
        let bytes = p.to_bytes().unwrap();
        assert_eq!(bytes.len(), p.encoded_len());
        assert_eq!(decode_point(&bytes).unwrap(), p);
    }

    #[test]
    fn routed_round_trip_both_roles() {
        let p = Point::new(9u64, vec![0.0, 3.0]);
        for role in [Role::Row, Role::Column] {
            let r = p.route_to(BlockKey(17), role);
            let bytes = r.to_bytes().unwrap();
            assert_eq!(bytes.len(), r.encoded_len());
            assert_eq!(decode_routed(&bytes).unwrap(), r);
        }
    }

    #[test]
    fn layout_is_little_endian() {
        let p = Point::new(1u64, vec![1.0]);
        let bytes = p.to_bytes().unwrap();
        assert_eq!(bytes[0], TAG_POINT);
        assert_eq!(&bytes[1..9], &1u64.to_le_bytes());
        assert_eq!(&bytes[9..13], &1u32.to_le_bytes());
        assert_eq!(&bytes[13..21], &1.0f64.to_le_bytes());
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let bytes = Point::new(1u64, vec![1.0, 2.0]).to_bytes().unwrap();
        for cut in 0..bytes.len() {
            assert!(matches!(decode(&bytes[..cut]), Err(Error::Codec(_))), "cut at {cut}");
        }
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut buf = BytesMut::new();
        Point::new(1u64, vec![1.0]).encode(&mut buf).unwrap();
        buf.put_u8(0xFF);
        assert!(matches!(decode(&buf), Err(Error::Codec(_))));
    }

    #[test]
    fn unknown_tag_and_role_are_rejected() {
        assert!(matches!(decode(&[7]), Err(Error::Codec(_))));

        let mut bytes = Point::new(2u64, vec![1.0]).route_to(BlockKey(0), Role::Row).to_bytes().unwrap().to_vec();
        bytes[9] = 9;
        assert!(matches!(decode(&bytes), Err(Error::Codec(_))));
    }

    #[test]
    fn huge_dimension_count_does_not_allocate() {
        let mut buf = BytesMut::new();
        buf.put_u8(TAG_POINT);
        buf.put_u64_le(0);
        buf.put_u32_le(u32::MAX);
        assert!(matches!(decode(&buf), Err(Error::Codec(_))));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn dimension_count_beyond_u32_is_rejected() {
        assert_eq!(dimension_count(3).unwrap(), 3);
        assert_eq!(dimension_count(u32::MAX as usize).unwrap(), u32::MAX);
        assert!(matches!(dimension_count(u32::MAX as usize + 1), Err(Error::Codec(_))));
    }

    #[test]
    fn kind_mismatch() {
        let p = Point::new(3u64, vec![1.0]);
        assert!(decode_routed(&p.to_bytes().unwrap()).is_err());
        assert!(decode_point(&p.route_to(BlockKey(0), Role::Row).to_bytes().unwrap()).is_err());
    }
}
