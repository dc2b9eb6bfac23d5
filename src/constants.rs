//! Fixed values of the sensor-study CSV format and the service defaults.

use std::time::Duration;

/// Field separator of uploaded files and of generated error reports.
pub const CSV_SEPARATOR: u8 = b';';

/// Literal the sensor study writes when a reading is missing.
pub const MISSING_VALUE_INDICATOR: &str = "-200";

/// Header of the date column in uploaded files.
pub const DATE_COLUMN: &str = "Date";

/// Header of the time column in uploaded files.
pub const TIME_COLUMN: &str = "Time";

/// Rows per storage write.
pub const BATCH_SIZE: usize = 1000;

/// Data rows are reported by file line: one for the header, one for 1-based counting.
pub const ROW_INDEX_OFFSET: usize = 2;

/// Column schema of the error report.
pub const ERROR_REPORT_HEADERS: [&str; 17] = [
    "Row_Index",
    "Date",
    "Time",
    "CO(GT)",
    "PT08.S1(CO)",
    "NMHC(GT)",
    "C6H6(GT)",
    "PT08.S2(NMHC)",
    "NOx(GT)",
    "PT08.S3(NOx)",
    "NO2(GT)",
    "PT08.S4(NO2)",
    "PT08.S5(O3)",
    "T",
    "RH",
    "AH",
    "Error_Reasons",
];

pub const DATE_ERROR: &str = "Date is required and must be in DD/MM/YYYY format";
pub const TIME_ERROR: &str = "Time is required and must be in HH.MM.SS format";

/// How long a downloaded error report stays on disk.
pub const ERROR_FILE_CLEANUP_DELAY: Duration = Duration::from_secs(5 * 60);

/// Route prefix under which published error reports are downloadable.
pub const ERROR_DOWNLOAD_ROUTE: &str = "/api/readings/download-error";

pub const DEFAULT_PAGE_LIMIT: u32 = 1000;
pub const MAX_PAGE_LIMIT: u32 = 10_000;

pub const CACHE_TTL: Duration = Duration::from_secs(300);
pub const CACHE_MAX_ENTRIES: usize = 1000;

/// Age after which finished jobs become eligible for a sweep.
pub const JOB_MAX_AGE_HOURS: i64 = 24;

/// Reader buffer for uploads (1 MiB).
pub const READ_BUFFER_CAPACITY: usize = 1 << 20;
