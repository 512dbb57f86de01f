//! Clock helpers shared by the sync core and the document engine

use chrono::{DateTime, Datelike, Utc};

/// Wall-clock instant in UTC, used for every persisted and emitted timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Year assumed for file names that carry no year
pub fn current_year() -> i32 {
    now().year()
}
