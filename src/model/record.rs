use std::fmt;

/// Uniqueness key of a record: `(name, category)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub name: String,
    pub category: String,
}

/// A normalized item extracted from an item page
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    pub name: String,
    pub category: String,
    pub description: String,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub median_price: Option<i64>,
    pub in_stock: Option<bool>,
    pub stock_count: Option<i64>,
}

impl Record {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            name: self.name.clone(),
            category: self.category.clone(),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.category)
    }
}
