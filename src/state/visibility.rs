/// Catalog visibility of a product
use std::fmt;

/// Whether a product is shown in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// Listed normally
    #[default]
    Visible,

    /// Hidden after reaching the error threshold
    Hidden,
}

impl Visibility {
    pub fn is_hidden(&self) -> bool {
        matches!(self, Self::Hidden)
    }

    /// Converts the visibility to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Hidden => "hidden",
        }
    }

    /// Parses a visibility from its database string representation
    ///
    /// Returns None if the string doesn't match any known value.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "visible" => Some(Self::Visible),
            "hidden" => Some(Self::Hidden),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
