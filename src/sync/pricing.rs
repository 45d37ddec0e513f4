//! Tax and margin adjustment of extracted prices

use crate::sync::ExtractedPrices;

/// GST multiplier applied when a product adds tax
pub const TAX_RATE: f64 = 1.1;

/// Smallest margin applied when margins are enabled, in percent
pub const MIN_MARGIN_PERCENT: f64 = 1.0;

/// Rounds to cents
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-product adjustment settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceAdjustment {
    pub add_tax: bool,
    pub add_margin: bool,
    pub margin_percent: f64,
}

impl PriceAdjustment {
    /// Adjusts one price: tax first, then margin. Zero stays zero.
    pub fn apply_to(&self, price: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }

        let mut adjusted = price;
        if self.add_tax {
            adjusted = round2(adjusted * TAX_RATE);
        }
        if self.add_margin {
            let margin = self.margin_percent.max(MIN_MARGIN_PERCENT);
            adjusted = round2(adjusted * (1.0 + margin / 100.0));
        }
        adjusted
    }

    pub fn apply(&self, prices: &ExtractedPrices) -> AdjustedPrices {
        AdjustedPrices {
            regular: self.apply_to(prices.regular_price),
            sale: self.apply_to(prices.sale_price),
        }
    }
}

/// Prices after adjustment, as written to the catalog
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustedPrices {
    pub regular: f64,
    pub sale: f64,
}

impl AdjustedPrices {
    /// Sale price for the catalog; none when there is no sale
    pub fn catalog_sale(&self) -> Option<f64> {
        (self.sale > 0.0).then_some(self.sale)
    }

    /// Price customers pay: the sale price when on sale
    pub fn active(&self) -> f64 {
        self.catalog_sale().unwrap_or(self.regular)
    }
}
