use crate::codes::{normalize_code, parse_decimal};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header aliases for the SKU code, in priority order.
pub const CODE_HEADERS: [&str; 6] = ["code", "sku", "sku_code", "product_code", "codigo", "id"];

/// A decoded tabular row keyed by lower-snake-case header.
pub type RawSkuRow = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkuDraft {
    pub code: String,
    pub name: String,
    pub uom: String,
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub weight: Option<f64>,
}

impl SkuDraft {
    /// Maps a raw row onto SKU fields. `None` means the row has no usable
    /// code and is skipped.
    pub fn from_row(row: &RawSkuRow, default_uom: &str) -> Option<Self> {
        let raw_code = CODE_HEADERS
            .iter()
            .filter_map(|header| field(row, header))
            .next()?;
        let code = normalize_code(raw_code);
        if code.is_empty() {
            return None;
        }

        let name = field(row, "name").unwrap_or(&code).to_string();
        let uom = field(row, "uom").unwrap_or(default_uom).to_string();

        Some(Self {
            length: number(row, "length"),
            width: number(row, "width"),
            height: number(row, "height"),
            weight: number(row, "weight"),
            code,
            name,
            uom,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub created: u64,
    pub updated: u64,
    pub total: u64,
}

/// Lower-snake-case form of a tabular header: trimmed, lowercased, inner
/// whitespace runs collapsed to `_`.
pub fn normalize_header(header: &str) -> String {
    header
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn field<'a>(row: &'a RawSkuRow, header: &str) -> Option<&'a str> {
    row.get(header)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn number(row: &RawSkuRow, header: &str) -> Option<f64> {
    row.get(header).and_then(|value| parse_decimal(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_UOM;

    fn row(pairs: &[(&str, &str)]) -> RawSkuRow {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn code_aliases_follow_priority() {
        let draft = SkuDraft::from_row(
            &row(&[("id", "ignored"), ("sku_code", "abc-1"), ("codigo", "zzz")]),
            DEFAULT_UOM,
        )
        .expect("draft");
        assert_eq!(draft.code, "ABC-1");

        let draft = SkuDraft::from_row(&row(&[("code", "  "), ("sku", "x 9")]), DEFAULT_UOM)
            .expect("draft");
        assert_eq!(draft.code, "X9");
    }

    #[test]
    fn rows_without_code_are_skipped() {
        assert!(SkuDraft::from_row(&row(&[("name", "Tornillo")]), DEFAULT_UOM).is_none());
        assert!(SkuDraft::from_row(&row(&[("code", " \t ")]), DEFAULT_UOM).is_none());
    }

    #[test]
    fn blanks_fall_back_to_defaults() {
        let draft = SkuDraft::from_row(
            &row(&[("code", "ñu-7"), ("name", " "), ("uom", ""), ("weight", "1,25")]),
            DEFAULT_UOM,
        )
        .expect("draft");
        assert_eq!(draft.code, "NU-7");
        assert_eq!(draft.name, "NU-7");
        assert_eq!(draft.uom, "UND");
        assert_eq!(draft.weight, Some(1.25));
        assert_eq!(draft.length, None);
    }

    #[test]
    fn unparsable_numbers_stay_null() {
        let draft = SkuDraft::from_row(
            &row(&[("code", "a"), ("length", "n/a"), ("width", "0"), ("height", "")]),
            "BOX",
        )
        .expect("draft");
        assert_eq!(draft.length, None);
        assert_eq!(draft.width, Some(0.0));
        assert_eq!(draft.height, None);
        assert_eq!(draft.uom, "BOX");
    }

    #[test]
    fn headers_normalize_to_snake_case() {
        assert_eq!(normalize_header(" Product  Code "), "product_code");
        assert_eq!(normalize_header("UOM"), "uom");
    }
}
