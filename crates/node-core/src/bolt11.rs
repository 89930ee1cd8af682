//! Bolt11 payment request decoding.

use std::str::FromStr;

use lightning_invoice::Bolt11Invoice;

use crate::error::BackendError;

/// The parts of a payment request the gateway needs before paying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInvoice {
    /// Hex payment hash.
    pub payment_hash: String,
    /// `None` for zero-amount invoices.
    pub amount_msat: Option<u64>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl DecodedInvoice {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Parse a bolt11 string.
pub fn decode_bolt11(bolt11: &str) -> Result<DecodedInvoice, BackendError> {
    let invoice = Bolt11Invoice::from_str(bolt11.trim())
        .map_err(|e| BackendError::InvalidInvoice(e.to_string()))?;

    let created_at = invoice.duration_since_epoch().as_secs() as i64;
    let expires_at = created_at + invoice.expiry_time().as_secs() as i64;

    Ok(DecodedInvoice {
        payment_hash: invoice.payment_hash().to_string(),
        amount_msat: invoice.amount_milli_satoshis(),
        created_at,
        expires_at,
    })
}
