//! Kubernetes resource quantity strings

/// Parse a CPU quantity (`"500m"`, `"4"`, `"1.5"`, `"1e3"`) into cores
pub fn parse_cpu_cores(value: &str) -> Option<f64> {
    let value = value.trim();
    let cores = match value.strip_suffix('m') {
        Some(milli) => milli.parse::<f64>().ok()? / 1000.0,
        None => match value.strip_suffix('n') {
            Some(nano) => nano.parse::<f64>().ok()? / 1e9,
            None => match value.strip_suffix('u') {
                Some(micro) => micro.parse::<f64>().ok()? / 1e6,
                None => value.parse::<f64>().ok()?,
            },
        },
    };
    cores.is_finite().then_some(cores)
}

const BINARY_SUFFIXES: [(&str, f64); 6] = [
    ("Ki", 1024.0),
    ("Mi", 1048576.0),
    ("Gi", 1073741824.0),
    ("Ti", 1099511627776.0),
    ("Pi", 1125899906842624.0),
    ("Ei", 1152921504606846976.0),
];

const DECIMAL_SUFFIXES: [(&str, f64); 7] = [
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a memory quantity (`"16Gi"`, `"1024Ki"`, `"128M"`, `"1e3"`) into bytes
pub fn parse_bytes(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (number, multiplier) = BINARY_SUFFIXES
        .iter()
        .chain(DECIMAL_SUFFIXES.iter())
        .find_map(|(suffix, mult)| value.strip_suffix(suffix).map(|n| (n, *mult)))
        .unwrap_or((value, 1.0));

    let bytes = number.parse::<f64>().ok()? * multiplier;
    if !bytes.is_finite() || bytes < 0.0 {
        return None;
    }
    Some(bytes.round() as u64)
}
