const COUNTRY_CODE: &str = "254";

/// Produces the equivalent stored forms of a phone number.
///
/// Returns local (`0XXXXXXXXX`), country-code (`254XXXXXXXXX`) and
/// plus-prefixed (`+254XXXXXXXXX`) forms. Unrecognised shapes come back as
/// their digits only.
pub fn variants(raw: &str) -> Vec<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Vec::new();
    }

    let subscriber = match digits.len() {
        12 if digits.starts_with(COUNTRY_CODE) => Some(&digits[3..]),
        10 if digits.starts_with('0') => Some(&digits[1..]),
        9 if !digits.starts_with('0') => Some(digits.as_str()),
        _ => None,
    };

    match subscriber {
        Some(subscriber) => vec![
            format!("0{subscriber}"),
            format!("{COUNTRY_CODE}{subscriber}"),
            format!("+{COUNTRY_CODE}{subscriber}"),
        ],
        None => vec![digits],
    }
}

/// Country-code form used when sending SMS.
pub fn to_international(raw: &str) -> Option<String> {
    variants(raw)
        .into_iter()
        .find(|v| v.len() == 12 && v.starts_with(COUNTRY_CODE))
}
