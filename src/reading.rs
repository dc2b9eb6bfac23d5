//! Record types shared by validation, ingestion and storage.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The thirteen measurement columns of the sensor study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Co,
    Pt08S1Co,
    Nmhc,
    C6h6,
    Pt08S2Nmhc,
    Nox,
    Pt08S3Nox,
    No2,
    Pt08S4No2,
    Pt08S5O3,
    Temperature,
    RelativeHumidity,
    AbsoluteHumidity,
}

impl Measurement {
    /// Column order of the input file; rows are validated in this order.
    pub const ALL: [Measurement; 13] = [
        Measurement::Co,
        Measurement::Pt08S1Co,
        Measurement::Nmhc,
        Measurement::C6h6,
        Measurement::Pt08S2Nmhc,
        Measurement::Nox,
        Measurement::Pt08S3Nox,
        Measurement::No2,
        Measurement::Pt08S4No2,
        Measurement::Pt08S5O3,
        Measurement::Temperature,
        Measurement::RelativeHumidity,
        Measurement::AbsoluteHumidity,
    ];

    /// Order in which parameters are offered to dashboard clients.
    pub const PARAMETERS: [Measurement; 13] = [
        Measurement::Co,
        Measurement::Nmhc,
        Measurement::C6h6,
        Measurement::Nox,
        Measurement::No2,
        Measurement::Pt08S1Co,
        Measurement::Pt08S2Nmhc,
        Measurement::Pt08S3Nox,
        Measurement::Pt08S4No2,
        Measurement::Pt08S5O3,
        Measurement::Temperature,
        Measurement::RelativeHumidity,
        Measurement::AbsoluteHumidity,
    ];

    /// Header of this measurement in the uploaded CSV, e.g. `PT08.S1(CO)`.
    pub fn column(self) -> &'static str {
        match self {
            Measurement::Co => "CO(GT)",
            Measurement::Pt08S1Co => "PT08.S1(CO)",
            Measurement::Nmhc => "NMHC(GT)",
            Measurement::C6h6 => "C6H6(GT)",
            Measurement::Pt08S2Nmhc => "PT08.S2(NMHC)",
            Measurement::Nox => "NOx(GT)",
            Measurement::Pt08S3Nox => "PT08.S3(NOx)",
            Measurement::No2 => "NO2(GT)",
            Measurement::Pt08S4No2 => "PT08.S4(NO2)",
            Measurement::Pt08S5O3 => "PT08.S5(O3)",
            Measurement::Temperature => "T",
            Measurement::RelativeHumidity => "RH",
            Measurement::AbsoluteHumidity => "AH",
        }
    }

    /// Normalized name, used as query parameter and storage column.
    pub fn name(self) -> &'static str {
        match self {
            Measurement::Co => "co",
            Measurement::Pt08S1Co => "pt08_s1_co",
            Measurement::Nmhc => "nmhc",
            Measurement::C6h6 => "c6h6",
            Measurement::Pt08S2Nmhc => "pt08_s2_nmhc",
            Measurement::Nox => "nox",
            Measurement::Pt08S3Nox => "pt08_s3_nox",
            Measurement::No2 => "no2",
            Measurement::Pt08S4No2 => "pt08_s4_no2",
            Measurement::Pt08S5O3 => "pt08_s5_o3",
            Measurement::Temperature => "temperature",
            Measurement::RelativeHumidity => "relative_humidity",
            Measurement::AbsoluteHumidity => "absolute_humidity",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid parameter: {0}")]
pub struct UnknownParameter(pub String);

impl FromStr for Measurement {
    type Err = UnknownParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Measurement::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| UnknownParameter(s.to_string()))
    }
}

/// A validated time of day, rendered as zero-padded `HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn from_hms(hour: u32, minute: u32, second: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, second).map(TimeOfDay)
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M:%S"))
    }
}

impl From<TimeOfDay> for String {
    fn from(t: TimeOfDay) -> Self {
        t.to_string()
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = chrono::ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        NaiveTime::parse_from_str(&s, "%H:%M:%S").map(TimeOfDay)
    }
}

/// One data row as it appeared in the file, keyed by the exact header text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    fields: Vec<(String, String)>,
}

impl RawRow {
    /// Pairs headers with values. Short rows simply lack the trailing
    /// columns; surplus values without a header are dropped.
    pub fn from_record<'a, H, V>(headers: H, values: V) -> Self
    where
        H: IntoIterator<Item = &'a str>,
        V: IntoIterator<Item = &'a str>,
    {
        let fields = headers
            .into_iter()
            .zip(values)
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        Self { fields }
    }

    /// First value stored under `column`.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(h, _)| h == column)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`RawRow::get`] but yields `""` for absent columns.
    pub fn get_or_empty(&self, column: &str) -> &str {
        self.get(column).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(h, v)| (h.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Canonical record persisted for a valid row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedReading {
    pub date: NaiveDate,
    pub time: TimeOfDay,
    values: [Option<f64>; 13],
}

impl NormalizedReading {
    /// A reading with no measurement values yet.
    pub fn new(date: NaiveDate, time: TimeOfDay) -> Self {
        Self {
            date,
            time,
            values: [None; 13],
        }
    }

    pub fn get(&self, m: Measurement) -> Option<f64> {
        self.values[m.slot()]
    }

    pub fn set(&mut self, m: Measurement, value: f64) {
        self.values[m.slot()] = Some(value);
    }

    /// Present values in [`Measurement::ALL`] order.
    pub fn measurements(&self) -> impl Iterator<Item = (Measurement, f64)> + '_ {
        Measurement::ALL
            .into_iter()
            .filter_map(|m| self.get(m).map(|v| (m, v)))
    }
}

/// Outcome of validating one data row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowValidationResult {
    /// Line of the row in the uploaded file (header is line 1).
    pub row_index: usize,
    pub original: RawRow,
    pub errors: Vec<String>,
    /// Present exactly when the row is valid.
    pub reading: Option<NormalizedReading>,
}

impl RowValidationResult {
    pub fn is_valid(&self) -> bool {
        self.reading.is_some()
    }
}
