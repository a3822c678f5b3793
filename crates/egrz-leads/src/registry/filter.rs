use crate::regions::RegionLabel;
use chrono::NaiveDate;

/// OData filter that restricts the export to one region (case-insensitive
/// substring of the subject name) and one calendar day, both ends inclusive.
pub(crate) fn region_day_filter(region: &RegionLabel, date: NaiveDate) -> String {
    let name = region.name().replace('\'', "''");
    let day = date.format("%Y-%m-%d");

    format!(
        "contains(tolower(SubjectRf), tolower('{name}')) \
        and ExpertiseDate ge {day}T00:00:00.000Z \
        and ExpertiseDate le {day}T23:59:59.999Z"
    )
}
