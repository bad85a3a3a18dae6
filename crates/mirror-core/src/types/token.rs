use serde::{Deserialize, Serialize};

use crate::error::{MirrorError, Result};

/// Immutable token metadata, fetched once per token at task startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMeta {
    pub name: String,
    pub symbol: String,
    /// Decimal precision: one whole token is `10^decimals` base units.
    pub decimals: u8,
    /// Transfer fee in base units, charged by the token ledger.
    pub fee: u128,
}

impl TokenMeta {
    fn scale(&self) -> Result<u128> {
        10u128
            .checked_pow(self.decimals as u32)
            .ok_or_else(|| MirrorError::InvalidAmount(format!(
                "unsupported precision: {} decimals",
                self.decimals
            )))
    }

    /// Render a raw base-unit quantity as a decimal string at this token's
    /// precision, with trailing fractional zeros trimmed. Exact: feeding the
    /// result back through [`TokenMeta::to_raw`] returns the input.
    pub fn to_display(&self, raw: u128) -> String {
        let Ok(scale) = self.scale() else {
            return raw.to_string();
        };
        if scale == 1 {
            return raw.to_string();
        }
        let whole = raw / scale;
        let frac = raw % scale;
        if frac == 0 {
            return whole.to_string();
        }
        let digits = format!("{:0width$}", frac, width = self.decimals as usize);
        format!("{whole}.{}", digits.trim_end_matches('0'))
    }

    /// Parse a user-typed decimal string into raw base units. Rejects empty
    /// input, stray characters, more than one dot, fractions longer than the
    /// declared precision, and values that overflow u128.
    pub fn to_raw(&self, text: &str) -> Result<u128> {
        let scale = self.scale()?;
        let malformed = || MirrorError::InvalidAmount(format!("malformed amount: {text:?}"));

        let (whole_text, frac_text) = match text.split_once('.') {
            Some((w, f)) => (w, f),
            None => (text, ""),
        };
        if whole_text.is_empty() && frac_text.is_empty() {
            return Err(malformed());
        }
        if !whole_text.bytes().all(|b| b.is_ascii_digit())
            || !frac_text.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(malformed());
        }
        if frac_text.len() > self.decimals as usize {
            return Err(MirrorError::InvalidAmount(format!(
                "more than {} fractional digits: {text:?}",
                self.decimals
            )));
        }

        let whole: u128 = if whole_text.is_empty() {
            0
        } else {
            whole_text.parse().map_err(|_| malformed())?
        };
        let mut frac: u128 = if frac_text.is_empty() {
            0
        } else {
            frac_text.parse().map_err(|_| malformed())?
        };
        // pad the fraction out to full precision
        for _ in frac_text.len()..self.decimals as usize {
            frac = frac
                .checked_mul(10)
                .ok_or_else(|| MirrorError::InvalidAmount(format!("amount overflows: {text:?}")))?;
        }

        whole
            .checked_mul(scale)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| MirrorError::InvalidAmount(format!("amount overflows: {text:?}")))
    }

    /// Display price of one whole base token in quote tokens, derived from a
    /// raw quote/base quantity pair. Display-only convenience; `None` when
    /// the base quantity is zero.
    pub fn price(&self, base: &TokenMeta, quote_raw: u128, base_raw: u128) -> Option<f64> {
        if base_raw == 0 {
            return None;
        }
        let quote_scale = self.scale().ok()? as f64;
        let base_scale = base.scale().ok()? as f64;
        Some((quote_raw as f64 / quote_scale) / (base_raw as f64 / base_scale))
    }
}

/// Spending approval granted to the vault, as reported by the token ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub amount: u128,
    pub expires_at: Option<u64>,
}

impl Allowance {
    /// Whether this allowance can cover `amount` right now.
    pub fn covers(&self, amount: u128, now_nanos: u64) -> bool {
        self.amount >= amount && self.expires_at.map_or(true, |at| at > now_nanos)
    }
}

/// Mutable per-token input state for the deposit/withdraw/transfer controls.
/// Failed writes leave it untouched so the user can resubmit without
/// re-typing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferForm {
    pub amount: String,
    pub recipient: String,
    pub busy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(decimals: u8) -> TokenMeta {
        TokenMeta {
            name: "Test".into(),
            symbol: "TST".into(),
            decimals,
            fee: 10,
        }
    }

    #[test]
    fn display_trims_trailing_zeros() {
        let m = meta(8);
        assert_eq!(m.to_display(0), "0");
        assert_eq!(m.to_display(150_000_000), "1.5");
        assert_eq!(m.to_display(100_000_000), "1");
        assert_eq!(m.to_display(1), "0.00000001");
        assert_eq!(m.to_display(123_456_789), "1.23456789");
    }

    #[test]
    fn zero_decimals_are_plain_integers() {
        let m = meta(0);
        assert_eq!(m.to_display(42), "42");
        assert_eq!(m.to_raw("42").unwrap(), 42);
    }

    #[test]
    fn raw_round_trips_at_declared_precision() {
        let m = meta(8);
        for raw in [0u128, 1, 99, 100_000_000, 150_000_000, 123_456_789, u64::MAX as u128] {
            assert_eq!(m.to_raw(&m.to_display(raw)).unwrap(), raw, "raw={raw}");
        }
    }

    #[test]
    fn to_raw_accepts_partial_fractions() {
        let m = meta(8);
        assert_eq!(m.to_raw("1.5").unwrap(), 150_000_000);
        assert_eq!(m.to_raw(".5").unwrap(), 50_000_000);
        assert_eq!(m.to_raw("2.").unwrap(), 200_000_000);
    }

    #[test]
    fn to_raw_rejects_malformed_input() {
        let m = meta(8);
        assert!(m.to_raw("").is_err());
        assert!(m.to_raw(".").is_err());
        assert!(m.to_raw("1.2.3").is_err());
        assert!(m.to_raw("-1").is_err());
        assert!(m.to_raw("1e8").is_err());
        assert!(m.to_raw("1.123456789").is_err()); // 9 fractional digits
        assert!(m.to_raw("abc").is_err());
    }

    #[test]
    fn to_raw_rejects_overflow() {
        let m = meta(8);
        assert!(m.to_raw("340282366920938463463374607431768211455").is_err());
    }

    #[test]
    fn price_is_quote_per_whole_base() {
        let quote = meta(8);
        let base = meta(8);
        // 2 quote for 1 base
        let p = quote.price(&base, 200_000_000, 100_000_000).unwrap();
        assert!((p - 2.0).abs() < 1e-9);
        assert!(quote.price(&base, 1, 0).is_none());
    }

    #[test]
    fn allowance_covers_checks_amount_and_expiry() {
        let open_ended = Allowance {
            amount: 100,
            expires_at: None,
        };
        assert!(open_ended.covers(100, 5));
        assert!(!open_ended.covers(101, 5));

        let expiring = Allowance {
            amount: 100,
            expires_at: Some(10),
        };
        assert!(expiring.covers(50, 9));
        assert!(!expiring.covers(50, 10));
        assert!(!expiring.covers(50, 11));
    }
}
