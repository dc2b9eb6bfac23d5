use crate::constants::{DATE_COLUMN, DATE_ERROR, TIME_COLUMN, TIME_ERROR};
use crate::parse::{parse_date, parse_numeric_value, parse_time};
use crate::reading::{Measurement, NormalizedReading, RawRow, RowValidationResult};

/// Validate one data row.
///
/// Only the date and time decide validity; a measurement that cannot be read
/// is left empty on the reading. Columns outside the known schema are ignored.
pub fn validate_row(row: RawRow, row_index: usize) -> RowValidationResult {
    let mut errors = Vec::new();

    let date = parse_date(row.get_or_empty(DATE_COLUMN));
    if date.is_none() {
        errors.push(DATE_ERROR.to_string());
    }

    let time = parse_time(row.get_or_empty(TIME_COLUMN));
    if time.is_none() {
        errors.push(TIME_ERROR.to_string());
    }

    let reading = match (date, time) {
        (Some(date), Some(time)) => {
            let mut reading = NormalizedReading::new(date, time);
            for m in Measurement::ALL {
                if let Some(value) = parse_numeric_value(row.get_or_empty(m.column())) {
                    reading.set(m, value);
                }
            }
            Some(reading)
        }
        _ => None,
    };

    RowValidationResult {
        row_index,
        original: row,
        errors,
        reading,
    }
}
