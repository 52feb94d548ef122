//! Text protocol front-end: `<path> <value> <timestamp>` triples separated
//! by any whitespace.

use super::{idle, ConnectionLimits, Intake};
use crate::core::{MetricPoint, Protocol, QuarryError, Result};
use bytes::{Buf, Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 8 * 1024;

/// Splits a byte stream into whitespace-delimited tokens.
#[derive(Debug)]
pub struct TokenReader<R> {
    reader: R,
    buf: BytesMut,
    idle_timeout: Duration,
    max_token_bytes: usize,
    eof: bool,
}

impl<R: AsyncRead + Unpin> TokenReader<R> {
    /// Wrap `reader` with the connection's limits.
    pub fn new(reader: R, limits: &ConnectionLimits) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
            idle_timeout: limits.idle_timeout,
            max_token_bytes: limits.max_token_bytes,
            eof: false,
        }
    }

    /// Next token, or `None` once the stream ends between tokens.
    pub async fn next_token(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.buf.iter().position(|b| !b.is_ascii_whitespace()) {
                Some(start) => self.buf.advance(start),
                None => self.buf.clear(),
            }

            if let Some(end) = self.buf.iter().position(u8::is_ascii_whitespace) {
                return self.take(end).map(Some);
            }
            if self.eof {
                return match self.buf.len() {
                    0 => Ok(None),
                    len => self.take(len).map(Some),
                };
            }
            if self.buf.len() > self.max_token_bytes {
                return Err(QuarryError::TokenTooLong {
                    limit: self.max_token_bytes,
                });
            }

            self.fill().await?;
        }
    }

    fn take(&mut self, len: usize) -> Result<Bytes> {
        if len > self.max_token_bytes {
            return Err(QuarryError::TokenTooLong {
                limit: self.max_token_bytes,
            });
        }
        Ok(self.buf.split_to(len).freeze())
    }

    async fn fill(&mut self) -> Result<()> {
        self.buf.reserve(READ_CHUNK);
        let read = idle(self.idle_timeout, self.reader.read_buf(&mut self.buf)).await?;
        if read == 0 {
            self.eof = true;
        }
        Ok(())
    }
}

/// Parse a sample value.
pub fn parse_value(token: &[u8]) -> Result<f64> {
    parse_token(token, "value")
}

/// Parse a timestamp as an unsigned 32-bit count of epoch seconds.
pub fn parse_timestamp(token: &[u8]) -> Result<u32> {
    parse_token(token, "timestamp")
}

fn parse_token<T: std::str::FromStr>(token: &[u8], field: &'static str) -> Result<T> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| QuarryError::InvalidNumber {
            field,
            token: String::from_utf8_lossy(token).into_owned(),
        })
}

/// Read triples until the peer closes the stream. Returns the number of
/// points forwarded.
pub async fn handle<R: AsyncRead + Unpin>(
    reader: R,
    intake: &Intake,
    limits: &ConnectionLimits,
) -> Result<u64> {
    let mut tokens = TokenReader::new(reader, limits);
    let mut point = MetricPoint::default();
    let mut forwarded = 0;

    loop {
        let Some(path) = tokens.next_token().await? else {
            return Ok(forwarded);
        };
        let value = tokens
            .next_token()
            .await?
            .ok_or(QuarryError::UnexpectedEof { tokens: 1 })?;
        let timestamp = tokens
            .next_token()
            .await?
            .ok_or(QuarryError::UnexpectedEof { tokens: 2 })?;

        let path = std::str::from_utf8(&path)
            .map_err(|_| QuarryError::protocol("metric path is not valid UTF-8"))?;
        point.refill(path, parse_value(&value)?, parse_timestamp(&timestamp)?);

        intake.forward(&point).await?;
        intake.stats.record_points(Protocol::Plaintext, 1);
        forwarded += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::receiver::testing::{limits, RecordingIntake};
    use pretty_assertions::assert_eq;

    async fn tokens_of(input: &[u8], max_token_bytes: usize) -> Result<Vec<String>> {
        let limits = ConnectionLimits {
            max_token_bytes,
            ..limits()
        };
        let mut reader = TokenReader::new(input, &limits);
        let mut out = Vec::new();
        while let Some(token) = reader.next_token().await? {
            out.push(String::from_utf8(token.to_vec()).unwrap());
        }
        Ok(out)
    }

    #[tokio::test]
    async fn test_tokens_split_on_any_whitespace() {
        let tokens = tokens_of(b"  a.b 1\t2\r\n\nc.d  3 4", 64).await.unwrap();
        assert_eq!(tokens, vec!["a.b", "1", "2", "c.d", "3", "4"]);
    }

    #[tokio::test]
    async fn test_token_limit() {
        let err = tokens_of(b"abcdefghij 1 2\n", 4).await.unwrap_err();
        assert!(matches!(err, QuarryError::TokenTooLong { limit: 4 }));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_value(b"0.42").unwrap(), 0.42);
        assert_eq!(parse_value(b"-7").unwrap(), -7.0);
        assert_eq!(parse_timestamp(b"1700000000").unwrap(), 1_700_000_000);
        assert!(matches!(
            parse_value(b"abc"),
            Err(QuarryError::InvalidNumber { field: "value", .. })
        ));
        assert!(parse_timestamp(b"-1").is_err());
        assert!(parse_timestamp(b"4294967296").is_err());
        assert!(parse_timestamp(b"1.5").is_err());
    }

    #[tokio::test]
    async fn test_single_triple() {
        let intake = RecordingIntake::new();
        let input = b"servers.web1.load 0.42 1700000000\n";
        let forwarded = handle(&input[..], &intake.intake, &limits()).await.unwrap();

        assert_eq!(forwarded, 1);
        assert_eq!(
            intake.points(),
            vec![MetricPoint::new("servers.web1.load", 0.42, 1_700_000_000)]
        );
        assert_eq!(intake.paths(), vec!["servers.web1.load"]);
    }

    #[tokio::test]
    async fn test_points_keep_stream_order() {
        let intake = RecordingIntake::new();
        let input = b"a 1 10\nb 2 20\na 3 30\n";
        handle(&input[..], &intake.intake, &limits()).await.unwrap();

        let values: Vec<f64> = intake.points().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_clean_close_without_input() {
        let intake = RecordingIntake::new();
        assert_eq!(handle(&b"\n  \n"[..], &intake.intake, &limits()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_partial_triple_emits_nothing() {
        let intake = RecordingIntake::new();
        let err = handle(&b"servers.web1.load"[..], &intake.intake, &limits())
            .await
            .unwrap_err();

        assert!(matches!(err, QuarryError::UnexpectedEof { tokens: 1 }));
        assert!(intake.points().is_empty());
    }

    #[tokio::test]
    async fn test_bad_value_stops_connection() {
        let intake = RecordingIntake::new();
        let err = handle(&b"a 1 10\nb nope 20\nc 3 30\n"[..], &intake.intake, &limits())
            .await
            .unwrap_err();

        assert!(matches!(err, QuarryError::InvalidNumber { field: "value", .. }));
        assert_eq!(intake.points(), vec![MetricPoint::new("a", 1.0, 10)]);
    }
}
