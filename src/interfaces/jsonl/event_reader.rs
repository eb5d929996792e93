use crate::domain::events::IntegrationEvent;
use crate::error::{BillingError, Result};
use std::io::{BufRead, BufReader, Read};

/// Reads integration events from a JSON-lines source.
///
/// Each non-blank line holds one event tagged with its `type`. Blank lines and
/// lines starting with `#` are skipped.
pub struct EventReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> EventReader<R> {
    /// Creates a new `EventReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    /// Returns an iterator that lazily reads and deserializes events.
    ///
    /// A malformed line yields an error for that line only; reading continues.
    pub fn events(self) -> impl Iterator<Item = Result<IntegrationEvent>> {
        self.reader.lines().filter_map(|line| match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    None
                } else {
                    Some(serde_json::from_str(trimmed).map_err(BillingError::from))
                }
            }
            Err(e) => Some(Err(BillingError::from(e))),
        })
    }
}
