//! Phone number normalization for CRM lookups.
//!
//! CRM users type numbers in whatever form they like, so a search has to
//! try every representation of the same number.

/// The three stored forms a phone number commonly takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneVariants {
    /// Digits only, country code included: `447700900123`.
    pub bare: String,
    /// Country code replaced by a trunk zero: `07700900123`.
    pub local: String,
    /// `+`-prefixed international form: `+447700900123`.
    pub canonical: String,
}

impl PhoneVariants {
    /// Normalize `raw` into all three forms.
    ///
    /// A leading `0` (without `+`) is read as a local number and
    /// `country_code` is prepended. A `00` international dialing prefix is
    /// dropped. Returns `None` when `raw` has no digits.
    pub fn parse(raw: &str, country_code: &str) -> Option<Self> {
        let raw = raw.trim();
        let has_plus = raw.starts_with('+');
        let mut digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return None;
        }

        let country_code: String = country_code.chars().filter(char::is_ascii_digit).collect();

        if !has_plus && digits.starts_with("00") {
            digits.drain(..2);
        } else if !has_plus && digits.starts_with('0') && !country_code.is_empty() {
            digits = format!("{country_code}{}", &digits[1..]);
        }

        let local = match digits.strip_prefix(country_code.as_str()) {
            Some(rest) if !country_code.is_empty() && !rest.is_empty() => format!("0{rest}"),
            _ => digits.clone(),
        };

        Some(Self {
            canonical: format!("+{digits}"),
            local,
            bare: digits,
        })
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.bare, &self.local, &self.canonical]
    }
}
