//! Resolution sinks.
//!
//! A sink receives one [`ResolutionRecord`] per resolved entry and applies it
//! to the local and remote stores. The core never writes to the stores
//! itself.

use crate::errors::SinkError;
use crate::model::ResolutionRecord;

/// Receives resolved entries when a session commits.
pub trait ResolutionSink {
    fn apply(&mut self, record: &ResolutionRecord) -> Result<(), SinkError>;
}

/// Collects records in memory.
impl ResolutionSink for Vec<ResolutionRecord> {
    fn apply(&mut self, record: &ResolutionRecord) -> Result<(), SinkError> {
        self.push(record.clone());
        Ok(())
    }
}
