use chrono::prelude::*;
use easy_ext::ext;

#[ext(DateTimeExt)]
pub(crate) impl DateTime<Utc> {
    /// Calendar date at the given fixed offset from UTC.
    fn local_date(&self, offset: FixedOffset) -> NaiveDate {
        self.with_timezone(&offset).date_naive()
    }
}
