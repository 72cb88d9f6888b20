//! Display helpers for prices and percentages.

/// Format a USD amount with thousands separators, e.g. `$1,234.56`.
///
/// Sub-dollar amounts keep more precision so small-cap prices stay readable.
pub fn usd(value: f64) -> String {
    let decimals = if value.abs() >= 1.0 || value == 0.0 {
        2
    } else {
        6
    };
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), ""));

    let sign = if value < 0.0 { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{}${}", sign, group_thousands(int_part))
    } else {
        format!("{}${}.{}", sign, group_thousands(int_part), frac_part)
    }
}

/// Signed percentage with two decimals, e.g. `+5.25%`.
pub fn pct(value: f64) -> String {
    if value > 0.0 {
        format!("+{:.2}%", value)
    } else {
        format!("{:.2}%", value)
    }
}

/// Compact notation for large figures such as market cap, e.g. `$1.23T`.
pub fn compact_usd(value: f64) -> String {
    const UNITS: [(f64, &str); 4] = [(1e12, "T"), (1e9, "B"), (1e6, "M"), (1e3, "K")];

    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    for (scale, suffix) in UNITS {
        if abs >= scale {
            return format!("{}${:.2}{}", sign, abs / scale, suffix);
        }
    }
    format!("{}${:.2}", sign, abs)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
