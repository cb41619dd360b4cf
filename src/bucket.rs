//! Date bucket names
//!
//! Buckets are top-level directories named after calendar days (`ddmmyyyy`).

use chrono::{Days, Local, NaiveDate};

/// Directory name format of one bucket
pub const BUCKET_FORMAT: &str = "%d%m%Y";

/// The last `days` calendar days in local time, newest first
pub fn date_buckets(days: usize) -> Vec<String> {
	date_buckets_from(Local::now().date_naive(), days)
}

/// `days` buckets ending at `today`, newest first
pub fn date_buckets_from(today: NaiveDate, days: usize) -> Vec<String> {
	(0..days as u64)
		.map_while(|offset| today.checked_sub_days(Days::new(offset)))
		.map(|date| date.format(BUCKET_FORMAT).to_string())
		.collect()
}


// vim: ts=4
