/// Dollar amount with thousands separators: `$1,234.56`, `-$80.25`.
/// Rounds to whole cents first, so `-0.001` prints as `$0.00`.
pub fn money(val: f64) -> String {
    let cents = (val * 100.0).round() as i64;
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let digits = (cents / 100).to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{sign}${grouped}.{:02}", cents % 100)
}

/// `42.5%`, or `-` when there is nothing to divide by.
pub fn percent(val: Option<f64>) -> String {
    match val {
        Some(p) => format!("{p:.1}%"),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_formatting() {
        assert_eq!(money(1234.56), "$1,234.56");
        assert_eq!(money(-500.00), "-$500.00");
        assert_eq!(money(0.0), "$0.00");
        assert_eq!(money(1000000.99), "$1,000,000.99");
        assert_eq!(money(-854.4), "-$854.40");
        assert_eq!(money(-0.001), "$0.00");
        assert_eq!(money(950.0), "$950.00");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(Some(42.456)), "42.5%");
        assert_eq!(percent(None), "-");
    }
}
