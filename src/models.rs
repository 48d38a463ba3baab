use serde::{Deserialize, Serialize};

/// Canonical event record handed to the presentation layer. A pure
/// projection of the catalog payload: fields are defaulted or coalesced,
/// never computed, and `id` mirrors the source id verbatim.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub start_date: String,
    pub end_date: Option<String>,
    pub venue: Venue,
    pub image_url: Option<String>,
    pub price_range: Option<PriceRange>,
    pub category: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Venue {
    pub name: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Default for Venue {
    fn default() -> Self {
        Self {
            name: "Unknown Venue".to_string(),
            address: String::new(),
            city: String::new(),
            country: String::new(),
            latitude: None,
            longitude: None,
        }
    }
}

/// Only the first price tier offered by the catalog is kept.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
    pub currency: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub favorite_events: Vec<String>,
    pub language: Language,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    En,
    #[serde(rename = "ar")]
    Ar,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ar => "ar",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Self::En),
            "ar" => Some(Self::Ar),
            _ => None,
        }
    }

    pub fn is_rtl(self) -> bool {
        matches!(self, Self::Ar)
    }
}

/// Search request fingerprint. Equal-by-value params (including the empty
/// set) identify the same cache entry.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SearchParams {
    pub keyword: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
}

impl SearchParams {
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self {
            keyword: Some(keyword.into()),
            ..Self::default()
        }
    }

    /// The events query only runs with a keyword or a city to search by.
    pub fn has_search_input(&self) -> bool {
        fn filled(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|s| !s.trim().is_empty())
        }
        filled(&self.keyword) || filled(&self.city)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApiResponse<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub size: u64,
}
