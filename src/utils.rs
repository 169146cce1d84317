/// Formats bytes as uppercase hexadecimal pairs separated by spaces.
pub(crate) fn format_hex(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "<empty>".to_string();
    }

    bytes
        .chunks(1)
        .map(hex::encode_upper)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Formats an optional RSSI for terminal output.
pub(crate) fn format_rssi(rssi: Option<i16>) -> String {
    match rssi {
        Some(value) => format!("{value} dBm"),
        None => "-".to_string(),
    }
}

/// Formats a measurement with a fixed number of decimals and its unit.
pub(crate) fn format_measurement(value: f32, decimals: usize, unit: &str) -> String {
    format!("{value:.decimals$} {unit}")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn format_hex_handles_empty_payload() {
        assert_eq!("<empty>", format_hex(&[]));
    }

    #[test]
    fn format_hex_formats_uppercase_pairs() {
        assert_eq!("01 58 A1 FF", format_hex(&[0x01, 0x58, 0xA1, 0xFF]));
    }

    #[rstest]
    #[case(None, "-")]
    #[case(Some(-43), "-43 dBm")]
    fn format_rssi_renders_optional_value(#[case] rssi: Option<i16>, #[case] expected: &str) {
        assert_eq!(expected, format_rssi(rssi));
    }

    #[rstest]
    #[case(13.0, 2, "V", "13.00 V")]
    #[case(-0.488, 1, "mg", "-0.5 mg")]
    fn format_measurement_rounds_to_decimals(
        #[case] value: f32,
        #[case] decimals: usize,
        #[case] unit: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(expected, format_measurement(value, decimals, unit));
    }
}
