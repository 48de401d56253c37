const BINARY_UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Renders a byte count with the largest binary unit keeping the value at or above one, e.g. `1536` as `1.5KiB`.
pub fn format_bytes(bytes: usize) -> String {
    let exponent = bytes.checked_ilog2().map_or(0, |log| log as usize / 10).min(BINARY_UNITS.len() - 1);
    if exponent == 0 {
        return format!("{}{}", bytes, BINARY_UNITS[0]);
    }

    format!("{:.1}{}", bytes as f64 / (1u64 << (10 * exponent)) as f64, BINARY_UNITS[exponent])
}
