//! GST (Goods and Services Tax) extraction for Canadian amounts
//!
//! Source amounts are tax-included, so GST is backed out of the gross:
//! `gst = gross * rate / (1 + rate)`, rounded to the cent.

use serde::{Deserialize, Serialize};

/// GST rate as a fraction (0.05 for 5%)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GstRate(pub f64);

impl GstRate {
    /// Federal GST, the only sales tax in Alberta
    pub const ALBERTA: GstRate = GstRate(0.05);

    pub fn is_valid(&self) -> bool {
        self.0.is_finite() && (0.0..1.0).contains(&self.0)
    }

    pub fn percent(&self) -> f64 {
        self.0 * 100.0
    }
}

impl Default for GstRate {
    fn default() -> Self {
        GstRate::ALBERTA
    }
}

/// Gross amount split into net + GST, all in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GstBreakdown {
    pub gross_cents: i64,
    pub gst_cents: i64,
    pub net_cents: i64,
}

impl GstBreakdown {
    /// Back GST out of a tax-included amount. Sign follows the gross.
    pub fn from_gross(gross_cents: i64, rate: GstRate) -> Self {
        let magnitude = gross_cents.unsigned_abs() as f64;
        let gst = (magnitude * rate.0 / (1.0 + rate.0)).round() as i64;
        let gst_cents = if gross_cents < 0 { -gst } else { gst };

        GstBreakdown {
            gross_cents,
            gst_cents,
            net_cents: gross_cents - gst_cents,
        }
    }

    /// Add GST on top of a net amount
    pub fn from_net(net_cents: i64, rate: GstRate) -> Self {
        let magnitude = net_cents.unsigned_abs() as f64;
        let gst = (magnitude * rate.0).round() as i64;
        let gst_cents = if net_cents < 0 { -gst } else { gst };

        GstBreakdown {
            gross_cents: net_cents + gst_cents,
            gst_cents,
            net_cents,
        }
    }
}
