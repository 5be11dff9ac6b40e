// JSON-lines journal of rationales and rule outcomes.
//
// One JSON object per line, tagged with `"type"`. Writes go to any
// `io::Write`, so the caller decides where the log lives and how it is
// buffered.

use crate::model::Rationale;
use crate::rules::Violation;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalEntry<'a> {
    Rationale(&'a Rationale),
    Violation(&'a Violation),
}

pub struct Journal<W: Write> {
    writer: W,
    lines: usize,
}

impl<W: Write> Journal<W> {
    pub fn new(writer: W) -> Self {
        Journal { writer, lines: 0 }
    }

    pub fn append(&mut self, entry: &JournalEntry<'_>) -> Result<(), JournalError> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    /// Write the rationale followed by each of its triggered rules.
    pub fn append_rationale(&mut self, rationale: &Rationale) -> Result<(), JournalError> {
        self.append(&JournalEntry::Rationale(rationale))?;
        for violation in &rationale.triggered_rules {
            self.append(&JournalEntry::Violation(violation))?;
        }
        Ok(())
    }

    /// Lines written so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn flush(&mut self) -> Result<(), JournalError> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
