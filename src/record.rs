//! Per-tick run log
//!
//! One tab-separated line per applied tick. The compact layout is
//! `measurement<TAB>output`; the extended layout appends the setpoint error
//! and the three term contributions. Lines are plain text so a run can be
//! appended to, concatenated or inspected by hand.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use crate::actuator::controller::PidSnapshot;
use crate::error::{ControlError, ControlResult};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickDetail {
    pub error: f64,
    pub term_p: f64,
    pub term_i: f64,
    pub term_d: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickRecord {
    pub measurement: f64,
    /// Value written to the actuator, after clamping.
    pub output: f64,
    pub detail: Option<TickDetail>,
}

impl TickRecord {
    pub fn compact(measurement: f64, output: f64) -> Self {
        Self {
            measurement,
            output,
            detail: None,
        }
    }

    pub fn extended(snapshot: &PidSnapshot, applied: f64) -> Self {
        Self {
            measurement: snapshot.measurement,
            output: applied,
            detail: Some(TickDetail {
                error: snapshot.error,
                term_p: snapshot.term_p,
                term_i: snapshot.term_i,
                term_d: snapshot.term_d,
            }),
        }
    }

    pub fn to_line(&self) -> String {
        match self.detail {
            None => format!("{}\t{}\n", self.measurement, self.output),
            Some(d) => format!(
                "{}\t{}\t{}\t{}\t{}\t{}\n",
                self.measurement, self.output, d.error, d.term_p, d.term_i, d.term_d
            ),
        }
    }

    /// Parse one line without its terminator. `line_no` is only used for errors.
    pub fn parse_line(line: &str, line_no: usize) -> ControlResult<Self> {
        let fields = line
            .split('\t')
            .map(|field| {
                field.trim().parse::<f64>().map_err(|_| ControlError::MalformedRecord {
                    line: line_no,
                    reason: format!("not a number: {:?}", field),
                })
            })
            .collect::<ControlResult<Vec<f64>>>()?;

        match fields.as_slice() {
            [measurement, output] => Ok(Self::compact(*measurement, *output)),
            [measurement, output, error, term_p, term_i, term_d] => Ok(Self {
                measurement: *measurement,
                output: *output,
                detail: Some(TickDetail {
                    error: *error,
                    term_p: *term_p,
                    term_i: *term_i,
                    term_d: *term_d,
                }),
            }),
            other => Err(ControlError::MalformedRecord {
                line: line_no,
                reason: format!("expected 2 or 6 fields, found {}", other.len()),
            }),
        }
    }
}

pub struct RunLogWriter<W: Write> {
    out: W,
    extended: bool,
    written: u64,
}

impl RunLogWriter<BufWriter<File>> {
    /// Open `path` for appending, creating it and its parent directory if needed.
    pub fn create(path: impl AsRef<Path>, extended: bool) -> ControlResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file), extended))
    }
}

impl<W: Write> RunLogWriter<W> {
    pub fn new(out: W, extended: bool) -> Self {
        Self {
            out,
            extended,
            written: 0,
        }
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// Record the tick described by `snapshot` with the value actually applied.
    pub fn log_tick(&mut self, snapshot: &PidSnapshot, applied: f64) -> ControlResult<()> {
        let record = if self.extended {
            TickRecord::extended(snapshot, applied)
        } else {
            TickRecord::compact(snapshot.measurement, applied)
        };
        self.write_record(&record)
    }

    pub fn write_record(&mut self, record: &TickRecord) -> ControlResult<()> {
        self.out.write_all(record.to_line().as_bytes())?;
        self.written += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> ControlResult<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> RunLogWriter<W> {
    pub fn boxed(self) -> RunLogWriter<Box<dyn Write + Send>> {
        RunLogWriter {
            out: Box::new(self.out),
            extended: self.extended,
            written: self.written,
        }
    }
}

/// Read every record, skipping blank lines and `#` comments.
pub fn read_records<R: BufRead>(reader: R) -> ControlResult<Vec<TickRecord>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        records.push(TickRecord::parse_line(trimmed, idx + 1)?);
    }
    Ok(records)
}
