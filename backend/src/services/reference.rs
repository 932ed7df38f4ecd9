//! Human-readable operation reference numbers

use chrono::{NaiveDate, Utc};
use shared::generate_reference_no;
use uuid::Uuid;

/// Length of the random hex suffix
const SUFFIX_LEN: usize = 8;

/// Generates `PREFIX-YYYYMMDD-XXXXXXXX` references.
///
/// Uniqueness is enforced by the store; callers regenerate on collision.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceGenerator;

impl ReferenceGenerator {
    /// Reference dated today (UTC)
    pub fn next(prefix: &str) -> String {
        Self::next_on(prefix, Utc::now().date_naive())
    }

    pub fn next_on(prefix: &str, date: NaiveDate) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        generate_reference_no(prefix, date, &suffix[..SUFFIX_LEN])
    }
}
