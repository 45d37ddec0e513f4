//! Price extraction from supplier HTML
//!
//! Prices are located with an ordered chain of strategies. Each later strategy
//! is a lower-confidence fallback and only runs when everything before it came
//! up empty:
//!
//! 1. Price class/id/microdata selectors
//! 2. `$` decimals anywhere in the raw markup
//! 3. The per-item price class used by some supplier storefronts
//! 4. "per item" / "/item" phrasing anywhere in the document text
//!
//! Sale detection (sale selectors, then crossed-out prices) only runs when
//! the first two strategies produced a regular price. Amounts quoted per item
//! are left to strategies 3 and 4, which rank every per-item amount found.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

/// Prices at or above this are treated as stray numbers (SKUs, phone numbers)
pub const PRICE_CEILING: f64 = 1_000_000.0;

/// Class token carried by per-item price paragraphs
const PER_ITEM_CLASS: &str = "gentronics-price";

/// Class tokens tried for the regular price, in priority order
const PRICE_CLASS_TOKENS: &[&str] = &[
    "price",
    "product-price",
    "regular-price",
    "current-price",
    "price-current",
    "woocommerce-price-amount",
    "amount",
    "wc-price",
    "product-price-value",
];

/// Non-class selectors tried after the class tokens
const PRICE_EXTRA_SELECTORS: &[&str] = &[
    "#price",
    "#product-price",
    r#"[itemprop="price"]"#,
    r#"[itemprop="lowPrice"]"#,
];

const SALE_CLASS_TOKENS: &[&str] = &[
    "sale-price",
    "special-price",
    "discount-price",
    "offer-price",
    "reduced-price",
    "on-sale",
    "price-sale",
];

const CROSSED_OUT_CLASS_TOKENS: &[&str] = &[
    "strikethrough",
    "line-through",
    "was-price",
    "old-price",
    "crossed-out",
];

static TEXT_PRICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\$\s*((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,2})?)",
        r"((?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d{1,2})?)",
        r"(\d+\.\d{2})",
        r"(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid price pattern"))
    .collect()
});

static MARKUP_PRICE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\$(\d{1,3}(?:,\d{3})*\.\d{2})",
        r#"(?i)"price"[^>]*>.*?\$?(\d{1,3}(?:,\d{3})*\.\d{2})"#,
        r#"(?i)class="[^"]*price[^"]*"[^>]*>.*?\$?(\d{1,3}(?:,\d{3})*\.\d{2})"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid markup pattern"))
    .collect()
});

static PER_ITEM_CLASS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\s*(\d+(?:,\d{3})*(?:\.\d+)?)\s*per\s*(?:item|unit|piece)")
        .expect("valid per-item pattern")
});

static ANY_DOLLAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\s*(\d+(?:,\d{3})*(?:\.\d+)?)").expect("valid dollar pattern"));

/// Amount followed by per-item wording inside one text fragment
static PER_ITEM_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\d\s*(?:per\s*(?:item|unit|piece|each)|/\s*(?:item|unit|piece|each))")
        .expect("valid per-item marker")
});

/// Per-item wording after an amount in raw markup, possibly behind tags
static PER_ITEM_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:\s*</?[a-z][^>]*>)*\s*(?:per\s*(?:item|unit|piece|each)|/\s*(?:item|unit|piece|each))",
    )
    .expect("valid per-item suffix")
});

static PER_ITEM_TEXT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\$(\d{1,4}(?:,\d{3})*(?:\.\d{2})?)\s*per\s*(?:item|unit|piece|each)",
        r"(?i)\$(\d{1,4}(?:,\d{3})*(?:\.\d{2})?)\s*/\s*(?:item|unit|piece|each)",
        r"(?i)(\d{1,4}(?:,\d{3})*(?:\.\d{2})?)\s*per\s*(?:item|unit|piece)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid per-item text pattern"))
    .collect()
});

/// Regular/sale price pair read from a page. `regular_price == 0.0` means no
/// price was found; `sale_price == 0.0` means no sale.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExtractedPrices {
    pub regular_price: f64,
    pub sale_price: f64,
}

impl ExtractedPrices {
    pub fn found(&self) -> bool {
        self.regular_price > 0.0
    }

    fn from_ranked(mut prices: Vec<f64>) -> Self {
        prices.sort_by(|a, b| b.total_cmp(a));
        prices.dedup();
        Self {
            regular_price: prices.first().copied().unwrap_or(0.0),
            sale_price: prices.get(1).copied().unwrap_or(0.0),
        }
    }
}

/// Extracts the first positive price from a fragment of text
///
/// Accepts `$1,234.56`, `1,234.56`, `1234.56` and `1234`; thousands
/// separators are stripped.
///
/// # Returns
///
/// The price, or `0.0` when the text holds no positive number
pub fn extract_price_from_text(text: &str) -> f64 {
    let text = text.trim();
    TEXT_PRICE_PATTERNS
        .iter()
        .filter_map(|pattern| pattern.captures(text))
        .filter_map(|caps| caps.get(1).map(|m| parse_number(m.as_str())))
        .find(|price| *price > 0.0)
        .unwrap_or(0.0)
}

fn parse_number(raw: &str) -> f64 {
    raw.replace(',', "").parse::<f64>().unwrap_or(0.0)
}

fn plausible(price: f64) -> bool {
    price.is_finite() && price > 0.0 && price < PRICE_CEILING
}

fn class_selector(token: &str) -> Option<Selector> {
    Selector::parse(&format!(r#"[class*="{}"]"#, token)).ok()
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Multi-strategy price extractor
///
/// Selectors are compiled once per parser; a parser is cheap to share.
#[derive(Debug)]
pub struct PriceParser {
    price: Vec<(String, Selector)>,
    sale: Vec<(String, Selector)>,
    crossed_out: Vec<(String, Selector)>,
    per_item_primary: Option<Selector>,
    per_item_any: Option<Selector>,
    price_paragraph: Option<Selector>,
}

impl Default for PriceParser {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceParser {
    pub fn new() -> Self {
        let labelled = |sources: Vec<String>| {
            sources
                .into_iter()
                .filter_map(|s| Selector::parse(&s).ok().map(|sel| (s, sel)))
                .collect::<Vec<_>>()
        };

        let price = PRICE_CLASS_TOKENS
            .iter()
            .map(|t| format!(r#"[class*="{}"]"#, t))
            .chain(PRICE_EXTRA_SELECTORS.iter().map(|s| s.to_string()))
            .collect();

        let sale = SALE_CLASS_TOKENS
            .iter()
            .map(|t| format!(r#"[class*="{}"]"#, t))
            .chain(std::iter::once(".sale .amount".to_string()))
            .collect();

        let crossed_out = CROSSED_OUT_CLASS_TOKENS
            .iter()
            .map(|t| format!(r#"[class*="{}"]"#, t))
            .chain(std::iter::once(r#"[style*="line-through"]"#.to_string()))
            .collect();

        Self {
            price: labelled(price),
            sale: labelled(sale),
            crossed_out: labelled(crossed_out),
            per_item_primary: Selector::parse(&format!(
                r#"p[class*="{}"][class*="price"]"#,
                PER_ITEM_CLASS
            ))
            .ok(),
            per_item_any: class_selector(PER_ITEM_CLASS),
            price_paragraph: Selector::parse(r#"p[class*="price"]"#).ok(),
        }
    }

    /// Extracts a regular/sale price pair from an HTML document. Never fails;
    /// a zero regular price signals that nothing usable was found.
    pub fn parse(&self, html: &str) -> ExtractedPrices {
        let document = Html::parse_document(html);
        let mut prices = ExtractedPrices::default();

        if let Some((label, price)) = self.first_regular_price(&document) {
            debug!("Found regular price using selector '{}': {}", label, price);
            prices.regular_price = price;
        } else {
            let price = extract_price_from_markup(html);
            if price > 0.0 {
                debug!("Found regular price in markup: {}", price);
                prices.regular_price = price;
            }
        }

        if prices.found() {
            let regular = prices.regular_price;
            if let Some((label, sale)) =
                self.first_price(&document, &self.sale, |p| plausible(p) && p < regular)
            {
                debug!("Found sale price using selector '{}': {}", label, sale);
                prices.sale_price = sale;
            }

            self.apply_crossed_out(&document, &mut prices);
            return prices;
        }

        let per_item = self.per_item_class_prices(&document);
        if per_item.found() {
            debug!(
                "Found prices using per-item class: regular {}, sale {}",
                per_item.regular_price, per_item.sale_price
            );
            return per_item;
        }

        let per_item = per_item_text_prices(&document_text(&document));
        if per_item.found() {
            debug!(
                "Found prices using per-item text: regular {}, sale {}",
                per_item.regular_price, per_item.sale_price
            );
        }
        per_item
    }

    fn first_regular_price(&self, document: &Html) -> Option<(&str, f64)> {
        self.price.iter().find_map(|(label, selector)| {
            document
                .select(selector)
                .map(|el| element_text(&el))
                .filter(|text| !PER_ITEM_MARKER.is_match(text))
                .map(|text| extract_price_from_text(&text))
                .find(|p| plausible(*p))
                .map(|p| (label.as_str(), p))
        })
    }

    fn first_price<'a>(
        &'a self,
        document: &Html,
        selectors: &'a [(String, Selector)],
        accept: impl Fn(f64) -> bool,
    ) -> Option<(&'a str, f64)> {
        selectors.iter().find_map(|(label, selector)| {
            document
                .select(selector)
                .map(|el| extract_price_from_text(&element_text(&el)))
                .find(|p| accept(*p))
                .map(|p| (label.as_str(), p))
        })
    }

    /// A struck-through price above the current regular price is the real
    /// regular price; the current one becomes the sale price. Only the first
    /// crossed-out price found is considered.
    fn apply_crossed_out(&self, document: &Html, prices: &mut ExtractedPrices) {
        let Some((label, crossed)) = self.first_price(document, &self.crossed_out, plausible)
        else {
            return;
        };

        if prices.sale_price == 0.0 && crossed > prices.regular_price {
            debug!(
                "Found crossed-out regular price using '{}': {} (sale {})",
                label, crossed, prices.regular_price
            );
            prices.sale_price = prices.regular_price;
            prices.regular_price = crossed;
        }
    }

    fn per_item_class_prices(&self, document: &Html) -> ExtractedPrices {
        let mut found: Vec<f64> = self
            .per_item_primary
            .iter()
            .flat_map(|sel| document.select(sel))
            .map(|el| per_item_price_from_text(&element_text(&el)))
            .filter(|p| plausible(*p))
            .collect();

        if found.is_empty() {
            let any = self
                .per_item_any
                .iter()
                .flat_map(|sel| document.select(sel))
                .map(|el| per_item_price_from_text(&element_text(&el)))
                .find(|p| plausible(*p));

            let fallback = any.or_else(|| {
                self.price_paragraph
                    .iter()
                    .flat_map(|sel| document.select(sel))
                    .map(|el| element_text(&el))
                    .filter(|text| text.to_lowercase().contains("per item"))
                    .map(|text| per_item_price_from_text(&text))
                    .find(|p| plausible(*p))
            });

            found.extend(fallback);
        }

        ExtractedPrices::from_ranked(found)
    }
}

/// Whole-markup fallback for pages whose price classes held no number
fn extract_price_from_markup(html: &str) -> f64 {
    MARKUP_PRICE_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(html))
        .filter_map(|caps| caps.get(1))
        .filter(|m| !PER_ITEM_SUFFIX.is_match(&html[m.end()..]))
        .map(|m| parse_number(m.as_str()))
        .find(|p| plausible(*p))
        .unwrap_or(0.0)
}

/// "$2,640 per item", "$1197.9per unit", falling back to any `$` amount
fn per_item_price_from_text(text: &str) -> f64 {
    let text = text.trim();
    [&*PER_ITEM_CLASS_PATTERN, &*ANY_DOLLAR_PATTERN]
        .iter()
        .filter_map(|pattern| pattern.captures(text))
        .filter_map(|caps| caps.get(1).map(|m| parse_number(m.as_str())))
        .find(|p| *p > 0.0)
        .unwrap_or(0.0)
}

fn per_item_text_prices(text: &str) -> ExtractedPrices {
    let found = PER_ITEM_TEXT_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.captures_iter(text))
        .filter_map(|caps| caps.get(1).map(|m| parse_number(m.as_str())))
        .filter(|p| plausible(*p))
        .collect();
    ExtractedPrices::from_ranked(found)
}

/// Visible text of a document, text nodes joined by single spaces
fn document_text(document: &Html) -> String {
    document
        .root_element()
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
