use std::fmt;

/// Amounts are integer minor units (cents, kopecks) to avoid floating-point drift.
/// With two decimal places, 50.00 is stored as 5000.
pub type Minor = i64;

/// Decimal places used by every supported currency.
pub const MINOR_EXPONENT: u32 = 2;

/// Format minor units as a decimal string with `exponent` fractional digits.
/// Example: (5000, 2) -> "50.00", (-1234, 2) -> "-12.34", (7, 0) -> "7"
pub fn format_minor(amount: Minor, exponent: u32) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    if exponent == 0 {
        return format!("{}{}", sign, abs);
    }
    let scale = 10u64.pow(exponent);
    format!(
        "{}{}.{:0width$}",
        sign,
        abs / scale,
        abs % scale,
        width = exponent as usize
    )
}

/// Parse a decimal string into minor units.
///
/// Unlike display formatting this is strict: more fractional digits than the
/// currency carries is an error, so no value is silently dropped.
/// Example: ("50.00", 2) -> 5000, ("12.5", 2) -> 1250, ("100", 2) -> 10000
pub fn parse_minor(input: &str, exponent: u32) -> Result<Minor, ParseMinorError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (units_str, fraction_str) = match digits.split_once('.') {
        Some((units, fraction)) => (units, fraction),
        None => (digits, ""),
    };

    if units_str.is_empty() && fraction_str.is_empty() {
        return Err(ParseMinorError::InvalidFormat);
    }
    if !units_str.chars().all(|c| c.is_ascii_digit())
        || !fraction_str.chars().all(|c| c.is_ascii_digit())
    {
        return Err(ParseMinorError::InvalidFormat);
    }
    if fraction_str.len() > exponent as usize {
        return Err(ParseMinorError::TooPrecise { exponent });
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str.parse().map_err(|_| ParseMinorError::Overflow)?
    };

    // "12.5" with exponent 2 is 12 units and 50 minor units
    let padded = format!("{:0<width$}", fraction_str, width = exponent as usize);
    let fraction: i64 = if padded.is_empty() {
        0
    } else {
        padded.parse().map_err(|_| ParseMinorError::InvalidFormat)?
    };

    let amount = units
        .checked_mul(10i64.pow(exponent))
        .and_then(|scaled| scaled.checked_add(fraction))
        .ok_or(ParseMinorError::Overflow)?;

    Ok(if negative { -amount } else { amount })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseMinorError {
    InvalidFormat,
    TooPrecise { exponent: u32 },
    Overflow,
}

impl fmt::Display for ParseMinorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMinorError::InvalidFormat => write!(f, "invalid money format"),
            ParseMinorError::TooPrecise { exponent } => {
                write!(f, "at most {} decimal places allowed", exponent)
            }
            ParseMinorError::Overflow => write!(f, "amount out of range"),
        }
    }
}

impl std::error::Error for ParseMinorError {}
