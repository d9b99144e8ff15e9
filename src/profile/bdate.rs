use chrono::NaiveDate;

/// Non-leap year used to validate birth dates published without a year
const REFERENCE_YEAR: i32 = 2001;

/// Normalizes a `D.M.YYYY` or `D.M` birth date
///
/// Full dates become `YYYY-MM-DD`. Dates without a year become `--MM-DD`
/// after being checked against a non-leap year, so `29.2` is rejected.
/// Anything unparseable yields `None`.
pub fn normalize_bdate(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.trim().split('.').collect();

    let day: u32 = parts.first()?.parse().ok()?;
    let month: u32 = parts.get(1)?.parse().ok()?;

    match parts.len() {
        2 => {
            NaiveDate::from_ymd_opt(REFERENCE_YEAR, month, day)?;
            Some(format!("--{:02}-{:02}", month, day))
        }
        3 => {
            let year: i32 = parts[2].parse().ok()?;
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            Some(date.format("%Y-%m-%d").to_string())
        }
        _ => None,
    }
}
