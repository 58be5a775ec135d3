use std::fmt;

/// Coins are the platform's only currency and are always whole units.
pub type Coins = i64;

/// Format coins with thousands separators.
/// Example: 1500 -> "1,500", -20 -> "-20"
pub fn format_coins(coins: Coins) -> String {
    let sign = if coins < 0 { "-" } else { "" };
    let digits = coins.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{}{}", sign, grouped)
}

/// Parse a non-negative coin amount. Separators (`,` and `_`) are ignored.
/// Example: "1,500" -> 1500, "50" -> 50
pub fn parse_coins(input: &str) -> Result<Coins, ParseCoinsError> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| *c != ',' && *c != '_')
        .collect();

    if cleaned.is_empty() {
        return Err(ParseCoinsError::InvalidFormat);
    }
    if cleaned.starts_with('-') {
        return Err(ParseCoinsError::Negative);
    }

    cleaned
        .parse::<Coins>()
        .map_err(|_| ParseCoinsError::InvalidFormat)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseCoinsError {
    InvalidFormat,
    Negative,
}

impl fmt::Display for ParseCoinsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseCoinsError::InvalidFormat => write!(f, "invalid coin amount"),
            ParseCoinsError::Negative => write!(f, "coin amount cannot be negative"),
        }
    }
}

impl std::error::Error for ParseCoinsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_coins() {
        assert_eq!(format_coins(0), "0");
        assert_eq!(format_coins(50), "50");
        assert_eq!(format_coins(999), "999");
        assert_eq!(format_coins(1000), "1,000");
        assert_eq!(format_coins(1234567), "1,234,567");
        assert_eq!(format_coins(-20), "-20");
        assert_eq!(format_coins(-25000), "-25,000");
    }

    #[test]
    fn test_parse_coins() {
        assert_eq!(parse_coins("50"), Ok(50));
        assert_eq!(parse_coins(" 1,500 "), Ok(1500));
        assert_eq!(parse_coins("10_000"), Ok(10000));
        assert_eq!(parse_coins("0"), Ok(0));
    }

    #[test]
    fn test_parse_coins_invalid() {
        assert_eq!(parse_coins("abc"), Err(ParseCoinsError::InvalidFormat));
        assert_eq!(parse_coins("12.5"), Err(ParseCoinsError::InvalidFormat));
        assert_eq!(parse_coins(""), Err(ParseCoinsError::InvalidFormat));
        assert_eq!(parse_coins("-5"), Err(ParseCoinsError::Negative));
    }
}
