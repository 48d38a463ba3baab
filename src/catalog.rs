use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::models::{ApiResponse, Event, PriceRange, SearchParams, Venue};

const BASE_URL: &str = "https://app.ticketmaster.com/discovery/v2";
const API_KEY: &str = "HWbd3YMOdikgJGw5G6qCEYzAQueRb0wM";
const PAGE_SIZE: u64 = 20;

/// Served instead of an error when the classification endpoint is
/// unreachable; category filtering is not worth failing a screen over.
pub const FALLBACK_CATEGORIES: [&str; 5] =
    ["Music", "Sports", "Arts & Theater", "Family", "Other"];

/// Read-only client for the third-party events catalog. Every request
/// carries the API key; responses are normalized into [`Event`] before
/// leaving this module. Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogClient {
    pub fn new() -> Self {
        Self::with_base(BASE_URL, API_KEY)
    }

    /// Base URL and key are injectable so tests can point the client at a
    /// dead endpoint without touching the network.
    pub fn with_base(base_url: &str, api_key: &str) -> Self {
        let http = Client::builder()
            .user_agent("event-scout/0.1")
            .build()
            .expect("http client");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn search_events(
        &self,
        params: &SearchParams,
    ) -> Result<ApiResponse<Event>, ApiError> {
        let mut query: Vec<(&str, String)> = vec![("size", PAGE_SIZE.to_string())];
        if let Some(keyword) = filled(&params.keyword) {
            query.push(("keyword", keyword.to_string()));
        }
        if let Some(city) = filled(&params.city) {
            query.push(("city", city.to_string()));
        }
        if let Some(category) = filled(&params.category) {
            query.push(("classificationName", category.to_string()));
        }

        let body = self
            .get_json(&format!("{}/events.json", self.base_url), &query)
            .await?;
        search_response_from(body)
    }

    pub async fn event_details(&self, id: &str) -> Result<Event, ApiError> {
        let body = self
            .get_json(&format!("{}/events/{id}.json", self.base_url), &[])
            .await?;
        detail_from(body)
    }

    /// Distinct segment names from the classification taxonomy. Degrades to
    /// [`FALLBACK_CATEGORIES`] on any failure instead of propagating.
    pub async fn categories(&self) -> Vec<String> {
        let result = self
            .get_json(&format!("{}/classifications.json", self.base_url), &[])
            .await
            .and_then(categories_from);
        match result {
            Ok(categories) => categories,
            Err(err) => {
                tracing::warn!("category fetch failed, serving fallback list: {err}");
                FALLBACK_CATEGORIES.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let response = self
            .http
            .get(url)
            .query(&[("apikey", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response.json::<Value>().await?)
    }
}

fn filled(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

// Raw payload shapes. Every assumption about the catalog's JSON lives in
// these structs; `#[serde(default)]` keeps missing nested data from ever
// failing a decode.

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSearchResponse {
    #[serde(rename = "_embedded")]
    embedded: RawEventList,
    page: RawPage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEventList {
    events: Vec<RawEvent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPage {
    #[serde(rename = "totalElements")]
    total_elements: Option<u64>,
    number: Option<u64>,
    size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEvent {
    id: String,
    name: String,
    info: Option<String>,
    description: Option<String>,
    dates: RawDates,
    #[serde(rename = "_embedded")]
    embedded: RawEventEmbedded,
    images: Vec<RawImage>,
    #[serde(rename = "priceRanges")]
    price_ranges: Vec<RawPriceRange>,
    classifications: Vec<RawClassification>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDates {
    start: RawDateWindow,
    end: RawDateWindow,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawDateWindow {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    #[serde(rename = "localDate")]
    local_date: Option<String>,
}

impl RawDateWindow {
    fn coalesce(&self) -> Option<String> {
        self.date_time
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.local_date.clone().filter(|s| !s.is_empty()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEventEmbedded {
    venues: Vec<RawVenue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawVenue {
    name: Option<String>,
    address: RawAddress,
    city: RawNamed,
    country: RawCountry,
    location: RawLocation,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAddress {
    line1: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNamed {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCountry {
    #[serde(rename = "countryCode")]
    country_code: Option<String>,
}

// The catalog serves coordinates as strings; tolerate numbers too.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawLocation {
    latitude: Option<NumberOrString>,
    longitude: Option<NumberOrString>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

impl NumberOrString {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawImage {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPriceRange {
    min: Option<f64>,
    max: Option<f64>,
    currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawClassification {
    segment: RawNamed,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawClassificationList {
    #[serde(rename = "_embedded")]
    embedded: RawClassificationEmbedded,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawClassificationEmbedded {
    classifications: Vec<RawClassification>,
}

fn normalize(raw: RawEvent) -> Event {
    let venue = raw
        .embedded
        .venues
        .into_iter()
        .next()
        .map(|v| Venue {
            name: v
                .name
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Unknown Venue".to_string()),
            address: v.address.line1.unwrap_or_default(),
            city: v.city.name.unwrap_or_default(),
            country: v.country.country_code.unwrap_or_default(),
            latitude: v.location.latitude.as_ref().and_then(NumberOrString::as_f64),
            longitude: v
                .location
                .longitude
                .as_ref()
                .and_then(NumberOrString::as_f64),
        })
        .unwrap_or_default();

    let price_range = raw.price_ranges.into_iter().next().map(|tier| PriceRange {
        min: tier.min.unwrap_or(0.0),
        max: tier.max.unwrap_or(0.0),
        currency: tier.currency.unwrap_or_default(),
    });

    let category = raw
        .classifications
        .first()
        .and_then(|c| c.segment.name.clone())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Other".to_string());

    // First non-empty description field wins.
    let description = raw
        .info
        .filter(|s| !s.is_empty())
        .or(raw.description.filter(|s| !s.is_empty()));

    Event {
        id: raw.id,
        name: raw.name,
        description,
        start_date: raw.dates.start.coalesce().unwrap_or_default(),
        end_date: raw.dates.end.coalesce(),
        venue,
        image_url: raw.images.into_iter().next().and_then(|image| image.url),
        price_range,
        category,
    }
}

fn search_response_from(body: Value) -> Result<ApiResponse<Event>, ApiError> {
    let raw: RawSearchResponse = serde_json::from_value(body)?;
    let data: Vec<Event> = raw.embedded.events.into_iter().map(normalize).collect();
    Ok(ApiResponse {
        total: raw.page.total_elements.unwrap_or(data.len() as u64),
        page: raw.page.number.unwrap_or(0),
        size: raw.page.size.unwrap_or(PAGE_SIZE),
        data,
    })
}

/// The detail endpoint answers with either a bare event object or a
/// one-element `_embedded.events` wrapper; both are accepted.
fn detail_from(body: Value) -> Result<Event, ApiError> {
    if let Some(first) = body.pointer("/_embedded/events/0") {
        let raw: RawEvent = serde_json::from_value(first.clone())?;
        if raw.id.is_empty() {
            return Err(ApiError::NotFound);
        }
        return Ok(normalize(raw));
    }
    match serde_json::from_value::<RawEvent>(body) {
        Ok(raw) if !raw.id.is_empty() => Ok(normalize(raw)),
        Ok(_) => Err(ApiError::NotFound),
        Err(err) => Err(ApiError::Decode(err)),
    }
}

fn categories_from(body: Value) -> Result<Vec<String>, ApiError> {
    let raw: RawClassificationList = serde_json::from_value(body)?;
    let mut out: Vec<String> = Vec::new();
    for classification in raw.embedded.classifications {
        let Some(name) = classification.segment.name else {
            continue;
        };
        let clean = name.trim();
        if clean.is_empty() {
            continue;
        }
        if !out.iter().any(|existing| existing.as_str() == clean) {
            out.push(clean.to_string());
        }
    }
    Ok(out)
}
