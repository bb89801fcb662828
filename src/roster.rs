use std::path::Path;

use anyhow::Context;
use calamine::{open_workbook_auto, Data, Reader};
use derive_more::{Display, From};
use log::info;

/// Identifier of one attendee as printed by the barcode reader software.
#[derive(Clone, PartialEq, Eq, Hash, Debug, From, Display)]
pub struct AttendeeId(String);
impl From<&str> for AttendeeId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// Attendee identifiers in spreadsheet order.
#[derive(Clone, Default, PartialEq, Eq, Debug, From)]
pub struct Roster(Vec<AttendeeId>);

impl Roster {
    /// Reads column A of `sheet_name` in the workbook at `path`, top to bottom.
    ///
    /// A missing sheet is reported to the operator and yields an empty roster.
    /// Empty cells are skipped; every other cell, a header included, becomes an entry
    /// with its text unchanged.
    pub fn load(path: &Path, sheet_name: &str) -> anyhow::Result<Self> {
        let mut workbook = open_workbook_auto(path)
            .with_context(|| format!("Failed to open the attendance file {path:?}"))?;
        if !workbook.sheet_names().iter().any(|name| name == sheet_name) {
            report_error!("Sheet {sheet_name} not found in {}", path.display());
            return Ok(Self::default());
        }
        let range = workbook
            .worksheet_range(sheet_name)
            .with_context(|| format!("Failed to read sheet {sheet_name:?} of {path:?}"))?;
        // The range starts at the first used cell; a later start column means column A is blank.
        let attendees = match range.start() {
            Some((_, 0)) => range
                .rows()
                .filter_map(|row| row.first().and_then(attendee_id))
                .collect(),
            _ => vec![],
        };
        info!(
            "Loaded {} attendees from sheet {sheet_name:?} of {path:?}",
            attendees.len()
        );
        Ok(Self(attendees))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttendeeId> {
        self.0.iter()
    }
}

impl<'a> IntoIterator for &'a Roster {
    type Item = &'a AttendeeId;
    type IntoIter = std::slice::Iter<'a, AttendeeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn attendee_id(cell: &Data) -> Option<AttendeeId> {
    let id = match cell {
        Data::Empty => return None,
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        // Numeric ids come back as floats; `1234.0` must read as `1234`.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => (*f as i64).to_string(),
        other => other.to_string(),
    };
    (!id.is_empty()).then(|| id.into())
}
