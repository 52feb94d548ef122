//! Batch protocol front-end.
//!
//! Each frame is a 4-byte big-endian length followed by exactly that many
//! bytes of pickled `[(path, (timestamp, value)), ...]`. A connection may
//! carry any number of frames.

use super::{idle, ConnectionLimits, Intake};
use crate::core::{MetricPoint, Protocol, QuarryError, Result};
use crate::pickle::{DecodeError, Decoder, Encoder, Value};
use bytes::BufMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Size of the frame length prefix.
pub const HEADER_LEN: usize = 4;

/// Read frames until the peer closes the stream between frames. Returns the
/// number of points forwarded.
pub async fn handle<R: AsyncRead + Unpin>(
    mut reader: R,
    intake: &Intake,
    limits: &ConnectionLimits,
) -> Result<u64> {
    let mut frame = Vec::new();
    let mut forwarded = 0;

    while let Some(length) = read_header(&mut reader, limits).await? {
        if length > limits.max_batch_bytes {
            return Err(QuarryError::FrameTooLarge {
                length,
                limit: limits.max_batch_bytes,
            });
        }

        frame.resize(length, 0);
        idle(limits.idle_timeout, reader.read_exact(&mut frame))
            .await
            .map_err(|e| match e {
                QuarryError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                    QuarryError::protocol(format!("stream ended inside a {} byte frame", length))
                },
                other => other,
            })?;

        // The whole frame is validated before any point is forwarded.
        let points = decode_batch(&frame)?;
        intake.stats.record_batch();

        for point in &points {
            intake.forward(point).await?;
        }
        intake.stats.record_points(Protocol::Pickle, points.len() as u64);
        forwarded += points.len() as u64;
    }

    Ok(forwarded)
}

/// Length prefix of the next frame, or `None` if the stream ends first.
async fn read_header<R: AsyncRead + Unpin>(
    reader: &mut R,
    limits: &ConnectionLimits,
) -> Result<Option<usize>> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;

    while filled < HEADER_LEN {
        let read = idle(limits.idle_timeout, reader.read(&mut header[filled..])).await?;
        if read == 0 {
            return match filled {
                0 => Ok(None),
                _ => Err(QuarryError::protocol(format!(
                    "stream ended after {} of {} header bytes",
                    filled, HEADER_LEN
                ))),
            };
        }
        filled += read;
    }

    Ok(Some(u32::from_be_bytes(header) as usize))
}

/// Decode one frame payload into points.
pub fn decode_batch(frame: &[u8]) -> Result<Vec<MetricPoint>> {
    let mut decoder = Decoder::new(frame);
    let value = decoder.decode()?;
    if decoder.remaining() > 0 {
        debug!(trailing = decoder.remaining(), "Ignoring bytes after end of batch");
    }

    let items = match value {
        Value::List(items) => items,
        other => {
            return Err(DecodeError::TypeMismatch {
                expected: "list",
                found: other.type_name(),
            }
            .into())
        },
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| batch_point(index, item))
        .collect()
}

fn batch_point(index: usize, item: &Value) -> Result<MetricPoint> {
    let (path, sample) = pair(item).ok_or_else(|| {
        QuarryError::malformed(
            index,
            format!("expected (path, (timestamp, value)), found {}", describe(item)),
        )
    })?;

    let path = match path.as_str() {
        Some("") => return Err(QuarryError::malformed(index, "empty path")),
        Some(path) => path,
        None => {
            return Err(QuarryError::malformed(
                index,
                format!("path is a {}, expected string", path.type_name()),
            ))
        },
    };

    let (timestamp, value) = pair(sample).ok_or_else(|| {
        QuarryError::malformed(
            index,
            format!("expected (timestamp, value), found {}", describe(sample)),
        )
    })?;

    let timestamp = batch_timestamp(timestamp).ok_or_else(|| {
        QuarryError::malformed(index, format!("invalid timestamp {:?}", timestamp))
    })?;
    let value = value.as_f64().ok_or_else(|| {
        QuarryError::malformed(index, format!("value is a {}, expected number", value.type_name()))
    })?;

    Ok(MetricPoint::new(path, value, timestamp))
}

/// Integer timestamps must fit in 32 bits; float timestamps are truncated.
///
/// Carbon relays cast integer timestamps to 32 bits, silently wrapping
/// negative or far-future values. Those are rejected here instead, so a
/// bad sample cannot land at an unrelated time.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn batch_timestamp(value: &Value) -> Option<u32> {
    match value {
        Value::Integer(i) => u32::try_from(*i).ok(),
        Value::Float(f) if f.is_finite() && *f >= 0.0 && *f < 4_294_967_296.0 => Some(*f as u32),
        _ => None,
    }
}

fn pair(value: &Value) -> Option<(&Value, &Value)> {
    match value.as_sequence()? {
        [first, second] => Some((first, second)),
        _ => None,
    }
}

fn describe(value: &Value) -> String {
    match value.as_sequence() {
        Some(items) => format!("{} of {} elements", value.type_name(), items.len()),
        None => value.type_name().to_string(),
    }
}

/// Build one length-prefixed frame carrying `points`.
pub fn encode_batch(points: &[MetricPoint]) -> Vec<u8> {
    let batch = Value::List(
        points
            .iter()
            .map(|point| {
                Value::Tuple(vec![
                    Value::String(point.path.clone()),
                    Value::Tuple(vec![
                        Value::Integer(i64::from(point.timestamp)),
                        Value::Float(point.value),
                    ]),
                ])
            })
            .collect(),
    );

    let mut encoder = Encoder::new();
    encoder.write(&batch);
    let payload = encoder.finish();

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.extend_from_slice(&payload);
    frame
}
