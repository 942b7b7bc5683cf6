use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::HistoryStoreError;
use crate::record::{ConversationTurn, HistoryRecord};

/// Append-only JSONL file of finished turns.
///
/// Appends from several threads are serialized; each record is written as a
/// single line so a reader never sees a partial record from this process.
pub struct JsonlHistoryStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlHistoryStore {
    /// Use `path` as the history file, creating parent directories. The file
    /// itself is created on first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, HistoryStoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| {
                HistoryStoreError::io("creating history directory", parent, source)
            })?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp `turn` with a fresh id and the current time and append it.
    pub fn append(&self, turn: ConversationTurn) -> Result<HistoryRecord, HistoryStoreError> {
        let ts = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .map_err(HistoryStoreError::ClockFormat)?;
        let record = HistoryRecord::new(Uuid::new_v4().to_string(), ts, turn);

        let mut line = serde_json::to_string(&record)
            .map_err(|source| HistoryStoreError::json_serialize(&self.path, source))?;
        line.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| HistoryStoreError::LockPoisoned {
                path: self.path.clone(),
            })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| {
                HistoryStoreError::io("opening history file for append", &self.path, source)
            })?;
        file.write_all(line.as_bytes()).map_err(|source| {
            HistoryStoreError::io("appending history record", &self.path, source)
        })?;

        debug!(
            "appended history record {} to {}",
            record.id,
            self.path.display()
        );
        Ok(record)
    }

    /// Read every record. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryRecord>, HistoryStoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryStoreError::io(
                    "opening history file",
                    &self.path,
                    source,
                ))
            }
        };

        let mut records = Vec::new();
        for (line_index, line_result) in BufReader::new(file).lines().enumerate() {
            let line_number = line_index + 1;
            let line = line_result
                .map_err(|source| HistoryStoreError::io_line(&self.path, line_number, source))?;
            if line.trim().is_empty() {
                continue;
            }

            let record = serde_json::from_str::<HistoryRecord>(&line)
                .map_err(|source| HistoryStoreError::json_line(&self.path, line_number, source))?;
            validate_rfc3339(&self.path, line_number, &record.ts)?;
            records.push(record);
        }

        Ok(records)
    }

    /// Records of one conversation, in file order.
    pub fn for_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<HistoryRecord>, HistoryStoreError> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|record| record.conversation_id.as_deref() == Some(conversation_id))
            .collect())
    }
}

fn validate_rfc3339(path: &Path, line_number: usize, value: &str) -> Result<(), HistoryStoreError> {
    if OffsetDateTime::parse(value, &Rfc3339).is_err() {
        return Err(HistoryStoreError::InvalidTimestamp {
            path: path.to_path_buf(),
            line: line_number,
            value: value.to_string(),
        });
    }

    Ok(())
}
