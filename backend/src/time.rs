use chrono::{Local, Utc};

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// `YY-MM-DD` in local time, used to stamp archive names.
pub fn date_stamp() -> String {
    Local::now().format("%y-%m-%d").to_string()
}
