// 📋 Listing - One record from the paginated listing source
// Typed view over the raw JSON payload; the payload itself is kept as a snapshot

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Field-level fallback: a mistyped value reads as `None` instead of failing the record
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err) => {
            tracing::debug!("Ignoring mistyped field: {}", err);
            Ok(None)
        }
    }
}

pub(crate) fn lenient_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(lenient(deserializer)?.unwrap_or_default())
}

/// Listing values arrive either as numbers or as display text ("$12,995", "123,456 mi")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrText {
    Number(f64),
    Text(String),
}

impl NumberOrText {
    /// Whole-number value; display text is stripped of currency, separators and units.
    /// Anything unparseable is `None`.
    pub fn as_whole_number(&self) -> Option<i64> {
        match self {
            NumberOrText::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            NumberOrText::Number(_) => None,
            NumberOrText::Text(text) => {
                let cleaned: String = text
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                    .collect();
                cleaned.parse::<f64>().ok().map(|n| n.trunc() as i64)
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NumberOrText::Number(n) => Some(*n),
            NumberOrText::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(default, deserialize_with = "lenient")]
    pub vin: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub year: Option<NumberOrText>,
    #[serde(default, deserialize_with = "lenient")]
    pub price: Option<NumberOrText>,
    #[serde(default, deserialize_with = "lenient")]
    pub mileage: Option<NumberOrText>,
    #[serde(default, deserialize_with = "lenient")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub dealer_name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub trim: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub drivetrain: Option<String>,

    #[serde(rename = "displayColor", default, deserialize_with = "lenient")]
    pub exterior_color: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    pub interior_color: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub distance_from_origin: Option<NumberOrText>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<String>,

    /// Original payload snapshot
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl Listing {
    /// Build from a raw source record.
    ///
    /// Never fails: a mistyped field reads as absent and the others are kept.
    /// A payload that is not an object yields an empty listing.
    pub fn from_value(value: serde_json::Value) -> Self {
        let mut listing = match serde_json::from_value::<Listing>(value.clone()) {
            Ok(listing) => listing,
            Err(err) => {
                tracing::debug!("Listing payload is not a record ({})", err);
                Listing::default()
            }
        };

        listing.vin = listing
            .vin
            .as_deref()
            .map(|vin| vin.trim().to_ascii_uppercase())
            .filter(|vin| !vin.is_empty());
        listing.raw = value;
        listing
    }

    /// Normalized VIN, `None` when missing or blank
    pub fn vin(&self) -> Option<&str> {
        self.vin.as_deref()
    }

    /// Price in whole dollars, 0 when absent or unparseable
    pub fn price_value(&self) -> i64 {
        self.price.as_ref().and_then(NumberOrText::as_whole_number).unwrap_or(0)
    }

    /// Mileage in whole miles, 0 when absent or unparseable
    pub fn mileage_value(&self) -> i64 {
        self.mileage.as_ref().and_then(NumberOrText::as_whole_number).unwrap_or(0)
    }

    pub fn year_value(&self) -> Option<i32> {
        self.year
            .as_ref()
            .and_then(NumberOrText::as_whole_number)
            .and_then(|y| i32::try_from(y).ok())
    }

    pub fn distance_value(&self) -> Option<f64> {
        self.distance_from_origin.as_ref().and_then(NumberOrText::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_camel_case() {
        let listing = Listing::from_value(json!({
            "vin": " jt3ln130xl0012345 ",
            "year": 1990,
            "price": "$12,995",
            "mileage": "184,220 mi",
            "city": "Boise",
            "state": "ID",
            "dealerName": "Trail Motors",
            "displayColor": "Red",
            "interiorColor": "Gray",
            "distanceFromOrigin": 42,
            "createdAt": "2024-05-01T10:00:00Z",
            "somethingElse": {"nested": true}
        }));

        assert_eq!(listing.vin(), Some("JT3LN130XL0012345"));
        assert_eq!(listing.year_value(), Some(1990));
        assert_eq!(listing.price_value(), 12995);
        assert_eq!(listing.mileage_value(), 184220);
        assert_eq!(listing.dealer_name.as_deref(), Some("Trail Motors"));
        assert_eq!(listing.exterior_color.as_deref(), Some("Red"));
        assert_eq!(listing.distance_value(), Some(42.0));
        assert_eq!(listing.raw["somethingElse"]["nested"], json!(true));
    }

    #[test]
    fn test_numbers_and_garbage() {
        assert_eq!(NumberOrText::Number(8999.99).as_whole_number(), Some(8999));
        assert_eq!(NumberOrText::Text("120000 Miles".into()).as_whole_number(), Some(120000));
        assert_eq!(NumberOrText::Text("Call for price".into()).as_whole_number(), None);

        let listing = Listing::from_value(json!({"vin": "JT3LN130XL0012345", "price": "TBD"}));
        assert_eq!(listing.price_value(), 0);
        assert_eq!(listing.mileage_value(), 0);
    }

    #[test]
    fn test_blank_vin_is_missing() {
        assert_eq!(Listing::from_value(json!({"vin": "   "})).vin(), None);
        assert_eq!(Listing::from_value(json!({"vin": null})).vin(), None);
        assert_eq!(Listing::from_value(json!({"price": 100})).vin(), None);
    }

    #[test]
    fn test_mistyped_fields_keep_vin() {
        let listing = Listing::from_value(json!({"vin": "JT3LN130XL0012345", "city": 12}));

        assert_eq!(listing.vin(), Some("JT3LN130XL0012345"));
        assert_eq!(listing.city, None);
        assert_eq!(listing.raw["city"], json!(12));
    }

    #[test]
    fn test_one_mistyped_field_keeps_the_rest() {
        let listing = Listing::from_value(json!({
            "vin": "JT3VN39W5R8012345",
            "trim": 4,
            "price": "$7,450",
            "mileage": 212000,
            "city": "Bend",
            "state": "OR",
            "dealerName": "High Desert Autos",
            "year": {"value": 1994}
        }));

        assert_eq!(listing.vin(), Some("JT3VN39W5R8012345"));
        assert_eq!(listing.trim, None);
        assert_eq!(listing.year_value(), None);
        assert_eq!(listing.price_value(), 7450);
        assert_eq!(listing.mileage_value(), 212000);
        assert_eq!(listing.city.as_deref(), Some("Bend"));
        assert_eq!(listing.state.as_deref(), Some("OR"));
        assert_eq!(listing.dealer_name.as_deref(), Some("High Desert Autos"));
    }

    #[test]
    fn test_non_object_payload() {
        let listing = Listing::from_value(json!("JT3VN39W5R8012345"));
        assert_eq!(listing.vin(), None);
        assert_eq!(listing.raw, json!("JT3VN39W5R8012345"));
    }
}
