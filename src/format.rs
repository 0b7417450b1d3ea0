//! Money and number formatting for API payloads.

use rust_decimal::{Decimal, RoundingStrategy};

/// Symbol and fraction digits for currencies the formatter knows.
fn currency_info(code: &str) -> Option<(&'static str, u32)> {
    let info = match code {
        "CNY" => ("¥", 2),
        "USD" => ("$", 2),
        "EUR" => ("€", 2),
        "GBP" => ("£", 2),
        "JPY" => ("¥", 0),
        "HKD" => ("HK$", 2),
        "AUD" => ("A$", 2),
        "CAD" => ("C$", 2),
        "SGD" => ("S$", 2),
        "KRW" => ("₩", 0),
        "CHF" => ("CHF ", 2),
        _ => return None,
    };
    Some(info)
}

pub fn currency_symbol(code: &str) -> Option<&'static str> {
    currency_info(code).map(|(symbol, _)| symbol)
}

/// `1234.56` -> `1,234.56`, two fraction digits.
pub fn format_number(value: Decimal) -> String {
    format_number_dp(value, 2)
}

/// Thousands separators and exactly `decimals` fraction digits, rounding half away from zero.
pub fn format_number_dp(value: Decimal, decimals: u32) -> String {
    let (negative, body) = unsigned_body(value, decimals);
    if negative { format!("-{body}") } else { body }
}

/// `format_currency(-1234.56, "CNY")` -> `-¥1,234.56`. Unknown codes render as `XYZ 1,234.56`.
pub fn format_currency(value: Decimal, code: &str) -> String {
    match currency_info(code) {
        Some((symbol, decimals)) => {
            let (negative, body) = unsigned_body(value, decimals);
            let sign = if negative { "-" } else { "" };
            format!("{sign}{symbol}{body}")
        }
        None => {
            let (negative, body) = unsigned_body(value, 2);
            let sign = if negative { "-" } else { "" };
            format!("{sign}{code} {body}")
        }
    }
}

fn unsigned_body(value: Decimal, decimals: u32) -> (bool, String) {
    let mut rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    // -0.001 rounds to zero; never print "-0.00"
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    rounded.set_sign_positive(true);
    rounded.rescale(decimals);

    let text = rounded.to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let body = match frac_part {
        Some(f) => format!("{grouped}.{f}"),
        None => grouped,
    };
    (negative, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn formats_cny_amounts() {
        assert_eq!(format_currency(dec!(1234.56), "CNY"), "¥1,234.56");
        assert_eq!(format_currency(dec!(0), "CNY"), "¥0.00");
        assert_eq!(format_currency(dec!(-1234.56), "CNY"), "-¥1,234.56");
    }

    #[test]
    fn formats_plain_numbers() {
        assert_eq!(format_number(dec!(1234.56)), "1,234.56");
        assert_eq!(format_number(dec!(1234567.891)), "1,234,567.89");
        assert_eq!(format_number(dec!(999)), "999.00");
        assert_eq!(format_number_dp(dec!(-0.004), 2), "0.00");
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(format_number(dec!(2.345)), "2.35");
        assert_eq!(format_number(dec!(-2.345)), "-2.35");
    }

    #[test]
    fn zero_decimal_currencies_drop_fraction() {
        assert_eq!(format_currency(dec!(1234567.5), "JPY"), "¥1,234,568");
    }

    #[test]
    fn unknown_currency_uses_code_prefix() {
        assert_eq!(format_currency(dec!(12.5), "XYZ"), "XYZ 12.50");
        assert_eq!(currency_symbol("XYZ"), None);
    }
}
