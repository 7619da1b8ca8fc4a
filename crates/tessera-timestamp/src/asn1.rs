//! Reader helpers shared by the token parser and the verifier.

use chrono::{DateTime, NaiveDateTime, Utc};
use der::asn1::{AnyRef, ObjectIdentifier};
use der::{Decode, Reader, SliceReader, Tag, TagNumber, Tagged};

use crate::error::{TimestampError, TimestampResult};

/// Constructed `[n]`, used for EXPLICIT wrappers and IMPLICIT SETs.
pub(crate) const fn context(number: TagNumber) -> Tag {
    Tag::ContextSpecific {
        constructed: true,
        number,
    }
}

/// Primitive `[n]`.
pub(crate) const fn context_primitive(number: TagNumber) -> Tag {
    Tag::ContextSpecific {
        constructed: false,
        number,
    }
}

/// A reader over the contents of `value`, which must be tagged `tag`.
pub(crate) fn contents(value: AnyRef<'_>, tag: Tag) -> TimestampResult<SliceReader<'_>> {
    value.tag().assert_eq(tag)?;
    Ok(SliceReader::new(value.value())?)
}

/// Parse exactly one value from `bytes` and read its contents.
pub(crate) fn parse_single(bytes: &[u8], tag: Tag) -> TimestampResult<SliceReader<'_>> {
    contents(AnyRef::from_der(bytes)?, tag)
}

/// Whether the next value in `reader` is tagged `tag`.
pub(crate) fn next_is(reader: &SliceReader<'_>, tag: Tag) -> bool {
    reader.peek_tag().is_ok_and(|next| next == tag)
}

/// Skip the next value if it is tagged `tag`.
pub(crate) fn skip_optional(reader: &mut SliceReader<'_>, tag: Tag) -> TimestampResult<()> {
    if next_is(reader, tag) {
        reader.decode::<AnyRef<'_>>()?;
    }
    Ok(())
}

/// Magnitude bytes of an INTEGER, without the sign octet.
pub(crate) fn integer(value: AnyRef<'_>) -> TimestampResult<Vec<u8>> {
    value.tag().assert_eq(Tag::Integer)?;
    let bytes = match value.value() {
        [0, rest @ ..] if !rest.is_empty() => rest,
        bytes => bytes,
    };
    Ok(bytes.to_vec())
}

/// `AlgorithmIdentifier`, with NULL parameters reported as absent.
pub(crate) fn algorithm_identifier(
    value: AnyRef<'_>,
) -> TimestampResult<(ObjectIdentifier, Option<Vec<u8>>)> {
    let mut reader = contents(value, Tag::Sequence)?;
    let algorithm = reader.decode::<ObjectIdentifier>()?;
    let params = if reader.is_finished() {
        None
    } else {
        let params = reader.tlv_bytes()?;
        (AnyRef::from_der(params)?.tag() != Tag::Null).then(|| params.to_vec())
    };
    Ok(reader.finish((algorithm, params))?)
}

/// `GeneralizedTime`, including the fractional seconds TSAs commonly emit.
pub(crate) fn generalized_time(value: AnyRef<'_>) -> TimestampResult<DateTime<Utc>> {
    value.tag().assert_eq(Tag::GeneralizedTime)?;
    let text = std::str::from_utf8(value.value())
        .map_err(|_| TimestampError::Malformed("GeneralizedTime is not ASCII".into()))?;
    NaiveDateTime::parse_from_str(text, "%Y%m%d%H%M%S%.fZ")
        .map(|time| time.and_utc())
        .map_err(|e| TimestampError::Malformed(format!("GeneralizedTime {text:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_generalized_time_with_and_without_fraction() {
        let whole = AnyRef::new(Tag::GeneralizedTime, b"20240102030405Z").unwrap();
        let time = generalized_time(whole).unwrap();
        assert_eq!(time.to_rfc3339(), "2024-01-02T03:04:05+00:00");

        let fraction = AnyRef::new(Tag::GeneralizedTime, b"20240102030405.25Z").unwrap();
        assert_eq!(generalized_time(fraction).unwrap().nanosecond(), 250_000_000);

        let local = AnyRef::new(Tag::GeneralizedTime, b"20240102030405").unwrap();
        assert!(generalized_time(local).is_err());
        let wrong_tag = AnyRef::new(Tag::UtcTime, b"240102030405Z").unwrap();
        assert!(generalized_time(wrong_tag).is_err());
    }

    #[test]
    fn test_integer_magnitude() {
        let positive = AnyRef::new(Tag::Integer, &[0x00, 0x80]).unwrap();
        assert_eq!(integer(positive).unwrap(), vec![0x80]);
        let zero = AnyRef::new(Tag::Integer, &[0x00]).unwrap();
        assert_eq!(integer(zero).unwrap(), vec![0x00]);
    }

    #[test]
    fn test_null_parameters_are_absent() {
        let with_null = [
            0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05,
            0x00,
        ];
        let (algorithm, params) = algorithm_identifier(AnyRef::from_der(&with_null).unwrap())
            .unwrap();
        assert_eq!(algorithm, tessera_crypto::oid::SHA256);
        assert!(params.is_none());

        let mut trailing = with_null.to_vec();
        trailing[1] = 0x0f;
        trailing.extend([0x05, 0x00]);
        assert!(algorithm_identifier(AnyRef::from_der(&trailing).unwrap()).is_err());
    }
}
