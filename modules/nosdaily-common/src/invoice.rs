//! Amount decoding for BOLT11 payment invoices.
//!
//! Only the human-readable part is interpreted: `ln` + currency prefix +
//! optional amount with a multiplier. Signatures and tagged fields are not checked.

use crate::error::InvoiceError;

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const MSAT_PER_BTC: u64 = 100_000_000_000;
/// Bech32 checksum length; any real data part is longer.
const MIN_DATA_LEN: usize = 6;

/// Amount in millisatoshi encoded in the invoice's human-readable part.
pub fn amount_msat(invoice: &str) -> Result<u64, InvoiceError> {
    let lowered = invoice.trim().to_ascii_lowercase();
    let invoice = lowered.strip_prefix("lightning:").unwrap_or(&lowered);

    let sep = invoice.rfind('1').ok_or(InvoiceError::MissingSeparator)?;
    let (hrp, data) = (&invoice[..sep], &invoice[sep + 1..]);

    if data.len() < MIN_DATA_LEN || !data.chars().all(|c| BECH32_CHARSET.contains(c)) {
        return Err(InvoiceError::Malformed("invalid data part".into()));
    }

    let rest = hrp
        .strip_prefix("ln")
        .ok_or_else(|| InvoiceError::NotLightning(hrp.to_string()))?;

    let amount_start = rest
        .find(|c: char| c.is_ascii_digit())
        .ok_or(InvoiceError::MissingAmount)?;
    if amount_start == 0 {
        return Err(InvoiceError::Malformed("missing currency prefix".into()));
    }
    let amount = &rest[amount_start..];

    let (digits, multiplier) = match amount.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&amount[..amount.len() - 1], Some(c)),
        _ => (amount, None),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(InvoiceError::Malformed(format!("bad amount '{amount}'")));
    }
    let value: u64 = digits.parse().map_err(|_| InvoiceError::Overflow)?;

    let msat = match multiplier {
        None => value.checked_mul(MSAT_PER_BTC),
        Some('m') => value.checked_mul(MSAT_PER_BTC / 1_000),
        Some('u') => value.checked_mul(MSAT_PER_BTC / 1_000_000),
        Some('n') => value.checked_mul(MSAT_PER_BTC / 1_000_000_000),
        Some('p') => {
            if value % 10 != 0 {
                return Err(InvoiceError::SubMillisatoshi);
            }
            Some(value / 10)
        }
        Some(c) => return Err(InvoiceError::UnknownMultiplier(c)),
    };

    msat.ok_or(InvoiceError::Overflow)
}

/// Zap amount in whole satoshis: the invoice's millisatoshi amount divided by 1000.
pub fn zap_amount(invoice: &str) -> Result<i64, InvoiceError> {
    i64::try_from(amount_msat(invoice)? / 1_000).map_err(|_| InvoiceError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA: &str = "pvjluezpp5qqqsyqcyq5rqwzqf";

    #[test]
    fn decodes_each_multiplier() {
        assert_eq!(amount_msat(&format!("lnbc2500u1{DATA}")), Ok(250_000_000));
        assert_eq!(amount_msat(&format!("lnbc20m1{DATA}")), Ok(2_000_000_000));
        assert_eq!(amount_msat(&format!("lnbc30n1{DATA}")), Ok(3_000));
        assert_eq!(amount_msat(&format!("lnbc10p1{DATA}")), Ok(1));
        assert_eq!(amount_msat(&format!("lnbc1{DATA}")), Err(InvoiceError::MissingAmount));
    }

    #[test]
    fn whole_bitcoin_amount_without_multiplier() {
        assert_eq!(amount_msat(&format!("lntb21{DATA}")), Ok(2 * MSAT_PER_BTC));
    }

    #[test]
    fn zap_amount_truncates_to_satoshis() {
        assert_eq!(zap_amount(&format!("lnbc30n1{DATA}")), Ok(3));
        assert_eq!(zap_amount(&format!("lnbc25n1{DATA}")), Ok(2));
        assert_eq!(zap_amount(&format!("lnbc10p1{DATA}")), Ok(0));
    }

    #[test]
    fn accepts_uppercase_and_uri_prefix() {
        let upper = format!("LNBC30N1{}", DATA.to_ascii_uppercase());
        assert_eq!(zap_amount(&upper), Ok(3));
        assert_eq!(zap_amount(&format!("lightning:lnbcrt30n1{DATA}")), Ok(3));
    }

    #[test]
    fn rejects_malformed_invoices() {
        assert_eq!(amount_msat("garbage"), Err(InvoiceError::MissingSeparator));
        assert!(matches!(
            amount_msat(&format!("xxbc30n1{DATA}")),
            Err(InvoiceError::NotLightning(_))
        ));
        assert_eq!(amount_msat(&format!("lnbc25p1{DATA}")), Err(InvoiceError::SubMillisatoshi));
        assert_eq!(amount_msat(&format!("lnbc30x1{DATA}")), Err(InvoiceError::UnknownMultiplier('x')));
        assert!(matches!(amount_msat("lnbc30n1qq"), Err(InvoiceError::Malformed(_))));
        assert_eq!(
            amount_msat(&format!("lnbc99999999999999999999m1{DATA}")),
            Err(InvoiceError::Overflow)
        );
    }
}
