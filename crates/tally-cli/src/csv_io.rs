//! CSV decoding of SKU sheets and encoding of variance reports.

use anyhow::{Context, Result};
use std::io::{Read, Write};
use tally_core::import::{normalize_header, RawSkuRow};
use tally_core::views::VarianceReportRow;

/// Decodes a headed CSV into raw rows keyed by normalized header. Ragged
/// rows are accepted; missing trailing cells are simply absent.
pub fn read_sku_rows<R: Read>(input: R) -> Result<Vec<RawSkuRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(normalize_header)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read CSV row {}", index + 2))?;
        let row: RawSkuRow = headers
            .iter()
            .zip(record.iter())
            .filter(|(header, _)| !header.is_empty())
            .map(|(header, value)| (header.clone(), value.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

pub fn write_variance_report<W: Write>(output: W, rows: &[VarianceReportRow]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(output);
    for row in rows {
        writer.serialize(row).context("Failed to write variance row")?;
    }
    writer.flush().context("Failed to flush variance report")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_normalized() {
        let input = "Product Code, Name ,UOM\nt-1,Tornillo,CJ\nt-2,Tuerca\n";
        let rows = read_sku_rows(input.as_bytes()).expect("decode");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("product_code").map(String::as_str), Some("t-1"));
        assert_eq!(rows[0].get("name").map(String::as_str), Some("Tornillo"));
        assert_eq!(rows[0].get("uom").map(String::as_str), Some("CJ"));
        assert_eq!(rows[1].get("uom"), None);
    }

    #[test]
    fn decoded_rows_feed_the_importer() {
        let input = "codigo,length\n  ab 1 ,\"2,5\"\n";
        let rows = read_sku_rows(input.as_bytes()).expect("decode");
        let draft = tally_core::import::SkuDraft::from_row(&rows[0], "UND").expect("draft");
        assert_eq!(draft.code, "AB1");
        assert_eq!(draft.length, Some(2.5));
    }

    #[test]
    fn report_has_header_and_rows() {
        let rows = vec![VarianceReportRow {
            location_code: "ZA-R1-N0101-P01".to_string(),
            zone_code: "A".to_string(),
            rack_code: "1".to_string(),
            sku_code: "S-1".to_string(),
            sku_name: "Tornillo".to_string(),
            expected_qty: 100.0,
            found_qty: 106.0,
            difference: 6.0,
            percentage: 6.0,
            reason: String::new(),
        }];

        let mut buffer = Vec::new();
        write_variance_report(&mut buffer, &rows).expect("encode");
        let text = String::from_utf8(buffer).expect("utf8");
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("location_code,zone_code,rack_code,sku_code,sku_name,expected_qty,found_qty,difference,percentage,reason")
        );
        assert_eq!(
            lines.next(),
            Some("ZA-R1-N0101-P01,A,1,S-1,Tornillo,100.0,106.0,6.0,6.0,")
        );
        assert_eq!(lines.next(), None);
    }
}
