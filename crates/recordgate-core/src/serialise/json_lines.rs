//! Newline-delimited JSON serialiser

use super::{RecordIter, Serialiser};
use crate::{Error, Result};
use serde_json::Value;
use std::io::{BufRead, BufReader, Read, Write};

/// Decodes one JSON document per line into a [`Value`] record.
///
/// Blank lines are skipped. Records are re-encoded compactly, one per line.
#[derive(Debug, Clone, Default)]
pub struct JsonLinesSerialiser;

impl JsonLinesSerialiser {
    /// Create a new JSON-lines serialiser
    pub fn new() -> Self {
        Self
    }
}

impl Serialiser<Value> for JsonLinesSerialiser {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn deserialise<'a>(&self, input: &'a mut dyn Read) -> RecordIter<'a, Value> {
        let records = BufReader::new(input)
            .lines()
            .enumerate()
            .filter_map(|(index, line)| match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(serde_json::from_str(&line).map_err(|e| {
                    Error::serialisation(format!("line {}: {}", index + 1, e))
                })),
                Err(e) => Some(Err(Error::from(e))),
            });
        Box::new(records)
    }

    fn serialise(
        &self,
        records: &mut dyn Iterator<Item = Result<Value>>,
        output: &mut dyn Write,
    ) -> Result<()> {
        for record in records {
            let record = record?;
            serde_json::to_writer(&mut *output, &record)?;
            output.write_all(b"\n")?;
        }
        output.flush()?;
        Ok(())
    }
}
