//! Line-oriented text serialiser

use super::{RecordIter, Serialiser};
use crate::{Error, Result};
use std::io::{BufRead, BufReader, Read, Write};

/// Treats every UTF-8 line of a resource as one `String` record
#[derive(Debug, Clone, Default)]
pub struct LineSerialiser;

impl LineSerialiser {
    /// Create a new line serialiser
    pub fn new() -> Self {
        Self
    }
}

impl Serialiser<String> for LineSerialiser {
    fn name(&self) -> &str {
        "lines"
    }

    fn deserialise<'a>(&self, input: &'a mut dyn Read) -> RecordIter<'a, String> {
        Box::new(BufReader::new(input).lines().map(|line| line.map_err(Error::from)))
    }

    fn serialise(
        &self,
        records: &mut dyn Iterator<Item = Result<String>>,
        output: &mut dyn Write,
    ) -> Result<()> {
        for record in records {
            let record = record?;
            output.write_all(record.as_bytes())?;
            output.write_all(b"\n")?;
        }
        output.flush()?;
        Ok(())
    }
}
