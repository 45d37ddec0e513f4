//! Product catalog files for the `import` command
//!
//! ```toml
//! [[product]]
//! id = 101
//! name = "Steel Bracket"
//! source-url = "https://supplier.example.com/bracket"
//! add-tax = true
//! ```

use crate::storage::ProductImport;
use crate::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "product")]
    products: Vec<ProductImport>,
}

/// Loads and validates a catalog file
pub fn load_catalog(path: &Path) -> Result<Vec<ProductImport>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_catalog(&content)
}

/// Parses catalog TOML. IDs must be positive and unique.
pub fn parse_catalog(content: &str) -> Result<Vec<ProductImport>, ConfigError> {
    let catalog: CatalogFile = toml::from_str(content)?;

    let mut seen = HashSet::new();
    for product in &catalog.products {
        if product.id <= 0 {
            return Err(ConfigError::Validation(format!(
                "Product id must be positive, got {}",
                product.id
            )));
        }
        if !seen.insert(product.id) {
            return Err(ConfigError::Validation(format!(
                "Duplicate product id {}",
                product.id
            )));
        }
        if !product.margin_percent.is_finite() || product.margin_percent < 0.0 {
            return Err(ConfigError::Validation(format!(
                "Invalid margin-percent for product {}",
                product.id
            )));
        }
    }

    Ok(catalog.products)
}
