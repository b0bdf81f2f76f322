/// Smallest price Bandcamp accepts for a name-your-price item in `currency`.
///
/// Returns `None` for currencies Bandcamp does not sell in.
pub fn minimum_price(currency: &str) -> Option<f64> {
    let min = match currency {
        "USD" | "AUD" | "NZD" | "CHF" => 0.5,
        "GBP" | "EUR" => 0.25,
        "CAD" | "SGD" => 1.0,
        "JPY" => 70.0,
        "CZK" => 10.0,
        "DKK" | "HKD" => 2.5,
        "HUF" => 100.0,
        "ILS" => 1.5,
        "MXN" => 5.0,
        "NOK" | "PLN" | "SEK" => 3.0,
        _ => return None,
    };
    Some(min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_currencies_have_minimums() {
        assert_eq!(minimum_price("USD"), Some(0.5));
        assert_eq!(minimum_price("GBP"), Some(0.25));
        assert_eq!(minimum_price("JPY"), Some(70.0));
        assert_eq!(minimum_price("HUF"), Some(100.0));
    }

    #[test]
    fn unknown_currency_has_none() {
        assert_eq!(minimum_price("XYZ"), None);
        assert_eq!(minimum_price("usd"), None);
    }
}
