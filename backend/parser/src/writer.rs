//! CSV serialization — the write side of the `csvParse ∘ csvSerialize`
//! round trip required by spec.md §8.

use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;

pub fn write_csv<W: Write>(
    writer: W,
    headers: &[&str],
    rows: &[HashMap<&str, String>],
) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    csv_writer.write_record(headers)?;
    for row in rows {
        let record: Vec<String> = headers
            .iter()
            .map(|h| row.get(h).cloned().unwrap_or_default())
            .collect();
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}
