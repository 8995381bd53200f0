//! Row validation
//!
//! The first record is the header and fixes the column positions. A data
//! row is valid iff `provider`, `eventId`, `timestamp`, and `data` are all
//! present and non-empty; invalid rows are counted and dropped, never
//! failing the upload.

use thiserror::Error;

use super::ValidatedRow;

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("Header is missing required column {0:?}")]
    MissingColumn(&'static str),
}

/// Final row counts for one upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowStats {
    pub total: u64,
    pub invalid: u64,
}

impl RowStats {
    pub fn processed(&self) -> u64 {
        self.total - self.invalid
    }
}

pub struct RowValidator {
    provider_idx: usize,
    event_id_idx: usize,
    timestamp_idx: usize,
    data_idx: usize,
    stats: RowStats,
}

impl RowValidator {
    /// Build a validator from the header record.
    pub fn from_header(header: &[String]) -> Result<Self, HeaderError> {
        let find = |name: &'static str| -> Result<usize, HeaderError> {
            header
                .iter()
                .position(|column| normalize(column) == name)
                .ok_or(HeaderError::MissingColumn(name))
        };

        Ok(Self {
            provider_idx: find("provider")?,
            event_id_idx: find("eventId")?,
            timestamp_idx: find("timestamp")?,
            data_idx: find("data")?,
            stats: RowStats::default(),
        })
    }

    /// Validate one data row. Returns `None` for invalid rows, which are
    /// recorded in the stats.
    pub fn validate(&mut self, row: &[String]) -> Option<ValidatedRow> {
        self.stats.total += 1;

        let provider = non_empty(row.get(self.provider_idx));
        let event_id = non_empty(row.get(self.event_id_idx));
        let timestamp = non_empty(row.get(self.timestamp_idx));
        let data = non_empty(row.get(self.data_idx));

        match (provider, event_id, timestamp, data) {
            (Some(provider), Some(event_id), Some(timestamp), Some(data)) => Some(ValidatedRow {
                provider: provider.to_string(),
                event_id: event_id.to_string(),
                timestamp: timestamp.to_string(),
                data: data.to_string(),
            }),
            _ => {
                self.stats.invalid += 1;
                None
            },
        }
    }

    pub fn stats(&self) -> RowStats {
        self.stats
    }
}

fn non_empty(field: Option<&String>) -> Option<&String> {
    field.filter(|s| !s.is_empty())
}

/// Strip the UTF-8 BOM some exporters prepend to the first header cell.
fn normalize(column: &str) -> &str {
    column.trim_start_matches('\u{feff}').trim()
}
