//! Tolerant date parsing for the three formats spec.md §4.B names:
//! `YYYY-MM-DD`, `D-MMM-YY`, `DD/MM/YYYY`.

use chrono::NaiveDate;

pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%d/%m/%Y") {
        return Some(date);
    }
    if let Ok(date) = parse_d_mmm_yy(trimmed) {
        return Some(date);
    }
    None
}

/// `D-MMM-YY`, e.g. `2-Jan-25`. chrono's `%e-%b-%y` doesn't accept a
/// non-padded single-digit day on all platforms, so this is hand-rolled.
fn parse_d_mmm_yy(raw: &str) -> Result<NaiveDate, ()> {
    let parts: Vec<&str> = raw.split('-').collect();
    if parts.len() != 3 {
        return Err(());
    }
    let day: u32 = parts[0].parse().map_err(|_| ())?;
    let month = month_from_abbrev(parts[1]).ok_or(())?;
    let year_part: i32 = parts[2].parse().map_err(|_| ())?;
    let year = if year_part < 100 {
        if year_part < 70 {
            2000 + year_part
        } else {
            1900 + year_part
        }
    } else {
        year_part
    };
    NaiveDate::from_ymd_opt(year, month, day).ok_or(())
}

fn month_from_abbrev(raw: &str) -> Option<u32> {
    let lower = raw.trim().to_ascii_lowercase();
    let month = match lower.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}
