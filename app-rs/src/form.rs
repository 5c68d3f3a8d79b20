//! Helpers for UI input forms.
//!
//! Validation errors are plain strings meant for direct display under the
//! offending form field.

use prepd_api_core::types::amount::Amount;

/// Wallet top-ups must be between these bounds (whole currency units).
pub const MIN_TOPUP_WHOLE: u32 = 10;
pub const MAX_TOPUP_WHOLE: u32 = 50_000;

const MAX_TICKET_SUBJECT_LEN: usize = 120;
const MAX_TICKET_BODY_LEN: usize = 5_000;

/// Parse and validate a wallet top-up amount entered as whole currency
/// units, e.g. `"150"` or `"150.50"`.
pub fn validate_topup_amount(amount_str: &str) -> Result<Amount, String> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err("Enter an amount".to_owned());
    }

    let (whole_str, maybe_frac_str) = match amount_str.split_once('.') {
        Some((whole, frac)) => (whole, Some(frac)),
        None => (amount_str, None),
    };

    let whole = whole_str
        .parse::<u32>()
        .map_err(|_| "That isn't a valid amount".to_owned())?;

    // At most two fractional digits, zero-padded ("5" => 50 minor units).
    let frac = match maybe_frac_str {
        None => 0,
        Some(frac_str) if (1..=2).contains(&frac_str.len()) => {
            let frac = frac_str
                .parse::<u32>()
                .map_err(|_| "That isn't a valid amount".to_owned())?;
            let frac = i64::from(frac);
            if frac_str.len() == 1 {
                frac * 10
            } else {
                frac
            }
        }
        Some("") => return Err("That isn't a valid amount".to_owned()),
        Some(_) =>
            return Err("Amounts have at most 2 decimal places".to_owned()),
    };

    if whole < MIN_TOPUP_WHOLE {
        return Err(format!("The minimum top-up is {MIN_TOPUP_WHOLE}.00"));
    }
    if whole > MAX_TOPUP_WHOLE || (whole == MAX_TOPUP_WHOLE && frac > 0) {
        return Err(format!("The maximum top-up is {MAX_TOPUP_WHOLE}.00"));
    }

    let units = i64::from(whole) * Amount::UNITS_PER_WHOLE + frac;
    Amount::from_minor_units(units)
        .ok_or_else(|| "That isn't a valid amount".to_owned())
}

/// Validate a support ticket subject line.
pub fn validate_ticket_subject(subject: &str) -> Result<(), String> {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        return Err("Add a subject".to_owned());
    }
    if trimmed.chars().count() > MAX_TICKET_SUBJECT_LEN {
        return Err(format!(
            "Subjects can be at most {MAX_TICKET_SUBJECT_LEN} characters"
        ));
    }
    Ok(())
}

/// Validate a support ticket description or reply body.
pub fn validate_ticket_body(body: &str) -> Result<(), String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err("Describe the issue".to_owned());
    }
    if trimmed.chars().count() > MAX_TICKET_BODY_LEN {
        return Err(format!(
            "Descriptions can be at most {MAX_TICKET_BODY_LEN} characters"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    // A quick sanity check
    #[test]
    fn test_validate_topup_amount() {
        let valid = [
            ("10", 10_00),
            ("10.00", 10_00),
            (" 150 ", 150_00),
            ("150.5", 150_50),
            ("150.50", 150_50),
            ("50000", 50_000_00),
        ];

        let invalid = [
            "", "abc", "-10", "9.99", "0", "50000.01", "150.505", "10.",
        ];

        for (amount_str, expected_units) in valid {
            let amount = validate_topup_amount(amount_str).unwrap();
            assert_eq!(amount.minor_units(), expected_units);
        }
        for amount_str in invalid {
            validate_topup_amount(amount_str).unwrap_err();
        }
    }

    #[test]
    fn topup_amount_never_panics() {
        proptest::proptest!(|(s: String)| {
            let _ = validate_topup_amount(&s);
        });
    }

    #[test]
    fn test_validate_ticket_fields() {
        validate_ticket_subject("Payment stuck").unwrap();
        validate_ticket_subject("  ").unwrap_err();
        validate_ticket_subject(&"x".repeat(121)).unwrap_err();

        validate_ticket_body("The top-up never arrived.").unwrap();
        validate_ticket_body("").unwrap_err();
        validate_ticket_body(&"x".repeat(5_001)).unwrap_err();
    }
}
