//! Display formatting for currency and ratio values.

/// `$1,234.50` style rendering with thousands separators and 2 decimals.
pub fn format_currency(value: f64, symbol: &str) -> String {
    if !value.is_finite() {
        return format!("{}-", symbol);
    }
    let negative = value < 0.0;
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if negative { "-" } else { "" };
    format!("{}{}{}.{}", sign, symbol, grouped, frac_part)
}

/// `0.1` -> `10.0%` with the given number of decimals.
pub fn format_percentage(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    format!("{:.*}%", decimals, value * 100.0)
}
