//! The message transport seam and a newline-delimited JSON implementation.

use std::io::{self, BufRead, Write};

use serde_json::Value;
use tracing::warn;

/// One message handed to the bot.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
  /// Transport-assigned identifier used for acknowledgment.
  pub tag:     u64,
  pub payload: Value,
  /// The message as received, forwarded unchanged on acknowledgment.
  pub raw:     String,
}

impl Delivery {
  pub fn new(tag: u64, payload: Value) -> Self {
    let raw = payload.to_string();
    Self { tag, payload, raw }
  }
}

/// Source of events and sink of acknowledgments.
pub trait Transport {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The next message, or `None` when the input is exhausted.
  fn receive(&mut self) -> Result<Option<Delivery>, Self::Error>;

  /// Mark `delivery` as durably handled.
  fn acknowledge(&mut self, delivery: &Delivery) -> Result<(), Self::Error>;
}

/// Reads one JSON event per line; acknowledging writes the line downstream.
///
/// Lines that are not JSON are logged and skipped without acknowledgment.
/// Tags are 1-based line numbers.
pub struct JsonLinesTransport<R, W> {
  reader:  R,
  writer:  W,
  line_no: u64,
}

impl<R: BufRead, W: Write> JsonLinesTransport<R, W> {
  pub fn new(reader: R, writer: W) -> Self { Self { reader, writer, line_no: 0 } }

  pub fn into_writer(self) -> W { self.writer }
}

impl<R: BufRead, W: Write> Transport for JsonLinesTransport<R, W> {
  type Error = io::Error;

  fn receive(&mut self) -> io::Result<Option<Delivery>> {
    let mut line = String::new();
    loop {
      line.clear();
      if self.reader.read_line(&mut line)? == 0 {
        return Ok(None);
      }
      self.line_no += 1;

      let trimmed = line.trim();
      if trimmed.is_empty() {
        continue;
      }
      match serde_json::from_str(trimmed) {
        Ok(payload) => {
          return Ok(Some(Delivery {
            tag: self.line_no,
            payload,
            raw: trimmed.to_owned(),
          }));
        }
        Err(e) => warn!(line = self.line_no, error = %e, "skipping undecodable message"),
      }
    }
  }

  fn acknowledge(&mut self, delivery: &Delivery) -> io::Result<()> {
    writeln!(self.writer, "{}", delivery.raw)?;
    self.writer.flush()
  }
}
