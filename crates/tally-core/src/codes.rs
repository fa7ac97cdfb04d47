use unicode_normalization::UnicodeNormalization;

const COMBINING_MARKS: std::ops::RangeInclusive<char> = '\u{0300}'..='\u{036f}';

/// Canonical form of a zone, rack or SKU code: decomposed, accents and
/// whitespace removed, uppercased.
pub fn normalize_code(value: &str) -> String {
    strip_accents(value)
        .chars()
        .filter(|ch| !is_code_space(*ch))
        .collect::<String>()
        .to_uppercase()
}

/// Whitespace as ECMAScript `\s` defines it: Unicode `White_Space` minus
/// U+0085, plus the byte order mark U+FEFF.
fn is_code_space(ch: char) -> bool {
    (ch.is_whitespace() && ch != '\u{0085}') || ch == '\u{feff}'
}

/// Grouping key for duplicate detection. Only `[a-z0-9]` survives.
pub fn name_key(value: &str) -> String {
    strip_accents(value)
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
        .collect()
}

fn strip_accents(value: &str) -> String {
    value
        .nfd()
        .filter(|ch| !COMBINING_MARKS.contains(ch))
        .collect()
}

/// Clamps a raw coordinate to a non-negative integer. Non-finite input maps
/// to zero and fractions are truncated toward zero.
pub fn sanitize_range_value(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    if value >= f64::from(u32::MAX) {
        return u32::MAX;
    }
    value.trunc() as u32
}

pub fn build_location_code(zone_code: &str, rack_code: &str, row: u32, level: u32, pos: u32) -> String {
    let zone = normalize_code(zone_code);
    let rack = normalize_code(rack_code);
    format!("Z{zone}-R{rack}-N{row:02}{level:02}-P{pos:02}")
}

/// Parses a decimal that may use a comma as separator. Blank, unparsable
/// and non-finite values yield `None`.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = trimmed.replacen(',', ".", 1);
    leading_float(&normalized).filter(|value| value.is_finite())
}

// Accepts the longest numeric prefix, so "12.5cm" reads as 12.5.
fn leading_float(value: &str) -> Option<f64> {
    let bytes = value.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;

    while end < bytes.len() {
        let byte = bytes[end];
        match byte {
            b'+' | b'-' if end == 0 => {}
            b'+' | b'-' if seen_exp && matches!(bytes[end - 1], b'e' | b'E') => {}
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }

    let mut candidate = &value[..end];
    while !candidate.is_empty() {
        if let Ok(parsed) = candidate.parse::<f64>() {
            return Some(parsed);
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_code_pads_each_segment() {
        assert_eq!(build_location_code("A", "1", 1, 1, 2), "ZA-R1-N0101-P02");
        assert_eq!(build_location_code("b 2", "r", 12, 3, 7), "ZB2-RR-N1203-P07");
    }

    #[test]
    fn location_code_widens_past_two_digits() {
        assert_eq!(
            build_location_code("A", "1", 100, 5, 123),
            "ZA-R1-N10005-P123"
        );
    }

    #[test]
    fn location_code_is_stable_across_calls() {
        let first = build_location_code("Almacén", "Rack 3", 4, 2, 9);
        let second = build_location_code("Almacén", "Rack 3", 4, 2, 9);
        assert_eq!(first, second);
        assert_eq!(first, "ZALMACEN-RRACK3-N0402-P09");
    }

    #[test]
    fn normalize_code_strips_accents_and_whitespace() {
        assert_eq!(normalize_code("  ñandú  azul "), "NANDUAZUL");
        assert_eq!(normalize_code("\t\n"), "");
    }

    #[test]
    fn normalize_code_uses_ecmascript_whitespace() {
        assert_eq!(normalize_code("\u{feff}a\u{3000}b"), "AB");
        assert_eq!(normalize_code("a\u{0085}b"), "A\u{0085}B");
    }

    #[test]
    fn name_key_drops_punctuation() {
        assert_eq!(name_key("Caja, Cartón 10-L"), "cajacarton10l");
        assert_eq!(name_key("CAJA carton 10L"), "cajacarton10l");
        assert_eq!(name_key("***"), "");
    }

    #[test]
    fn sanitize_clamps_and_truncates() {
        assert_eq!(sanitize_range_value(-3.0), 0);
        assert_eq!(sanitize_range_value(f64::NAN), 0);
        assert_eq!(sanitize_range_value(f64::INFINITY), 0);
        assert_eq!(sanitize_range_value(4.9), 4);
        assert_eq!(sanitize_range_value(12.0), 12);
    }

    #[test]
    fn parse_decimal_accepts_comma_separator() {
        assert_eq!(parse_decimal("12,5"), Some(12.5));
        assert_eq!(parse_decimal(" 3.25 "), Some(3.25));
        assert_eq!(parse_decimal("7kg"), Some(7.0));
        assert_eq!(parse_decimal(""), None);
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("1e999"), None);
    }
}
