//! Typed access helpers for the columnar decode path.
//!
//! Decoders receive a `&dyn Array` plus a row index; these helpers downcast
//! to the concrete array type and normalize timestamp-like columns to
//! `(epoch micros, utc offset seconds)`.

use arrow_array::timezone::Tz;
use arrow_array::{
    Array, Date32Array, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampNanosecondArray, TimestampSecondArray,
};
use arrow_schema::{DataType, TimeUnit};
use chrono::Offset;

use crate::error::DecodeError;

const MICROS_PER_DAY: i64 = 86_400 * 1_000_000;

/// Downcasts a dynamic array to its concrete type.
#[inline]
pub(crate) fn downcast<A: Array + 'static>(arr: &dyn Array) -> Option<&A> {
    arr.as_any().downcast_ref::<A>()
}

/// Builds the type-mismatch error for a column whose Arrow type does not
/// match the destination slot.
pub(crate) fn type_error(arr: &dyn Array, target: &'static str) -> DecodeError {
    DecodeError::Type {
        value: format!("{} column", arr.data_type()),
        target,
        offset: 0,
        strukt: String::new(),
        field: String::new(),
    }
}

/// Extracts a timestamp-like value from the column at `row`, normalized to
/// epoch microseconds plus the zone's UTC offset at that instant. Returns
/// `None` when the column is not timestamp-shaped. An unknown timezone name
/// falls back to UTC.
pub(crate) fn timestamp_value(arr: &dyn Array, row: usize) -> Option<(i64, i32)> {
    match arr.data_type() {
        DataType::Timestamp(unit, tz) => {
            let raw = match unit {
                TimeUnit::Second => downcast::<TimestampSecondArray>(arr)?.value(row),
                TimeUnit::Millisecond => downcast::<TimestampMillisecondArray>(arr)?.value(row),
                TimeUnit::Microsecond => downcast::<TimestampMicrosecondArray>(arr)?.value(row),
                TimeUnit::Nanosecond => downcast::<TimestampNanosecondArray>(arr)?.value(row),
            };
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw.div_euclid(1_000),
            };
            let offset = tz
                .as_deref()
                .and_then(|name| zone_offset_seconds(name, micros))
                .unwrap_or(0);
            Some((micros, offset))
        }
        DataType::Date32 => {
            let days = downcast::<Date32Array>(arr)?.value(row);
            Some((i64::from(days) * MICROS_PER_DAY, 0))
        }
        _ => None,
    }
}

/// UTC offset of `name` at the given instant, in seconds. `None` for an
/// unknown zone name.
fn zone_offset_seconds(name: &str, micros: i64) -> Option<i32> {
    let tz: Tz = name.parse().ok()?;
    let utc = chrono::DateTime::from_timestamp_micros(micros)?;
    Some(
        chrono::TimeZone::offset_from_utc_datetime(&tz, &utc.naive_utc())
            .fix()
            .local_minus_utc(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_and_nano_units_normalize_to_micros() {
        let secs = TimestampSecondArray::from(vec![10i64]);
        assert_eq!(timestamp_value(&secs, 0), Some((10_000_000, 0)));

        let nanos = TimestampNanosecondArray::from(vec![1_234_567i64]);
        assert_eq!(timestamp_value(&nanos, 0), Some((1_234, 0)));
    }

    #[test]
    fn date32_is_midnight_utc() {
        let days = Date32Array::from(vec![3i32]);
        assert_eq!(timestamp_value(&days, 0), Some((3 * MICROS_PER_DAY, 0)));
    }

    #[test]
    fn named_zone_resolves_offset() {
        // 2021-07-01 is EDT, UTC-4.
        let micros = 1_625_140_800_000_000i64;
        let arr =
            TimestampMicrosecondArray::from(vec![micros]).with_timezone("America/New_York");
        assert_eq!(timestamp_value(&arr, 0), Some((micros, -4 * 3600)));
    }

    #[test]
    fn unknown_zone_falls_back_to_utc() {
        let arr = TimestampMillisecondArray::from(vec![1_000i64]).with_timezone("Not/AZone");
        assert_eq!(timestamp_value(&arr, 0), Some((1_000_000, 0)));
    }

    #[test]
    fn non_timestamp_column_yields_none() {
        let arr = arrow_array::Int64Array::from(vec![1i64]);
        assert_eq!(timestamp_value(&arr, 0), None);
    }
}
