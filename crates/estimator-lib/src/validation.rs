//! Request validation and normalization
//!
//! Checks every field of a [`PredictionRequest`] eagerly and collects all
//! violations before rejecting, so a client sees every problem in one round trip.

use crate::error::ValidationErrors;
use crate::models::{CarFeatures, PredictionRequest};
use serde_json::{Map, Value};

/// Minimum accepted model year (inclusive)
pub const MIN_YEAR: i64 = 1900;

/// Maximum accepted model year (inclusive)
pub const MAX_YEAR: i64 = 2026;

/// Minimum brand length in characters
pub const MIN_BRAND_LEN: usize = 2;

/// A request field as found in the submitted document
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field<T> {
    Missing,
    Mistyped(&'static str),
    Present(T),
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Field::Missing, Field::Present)
    }
}

/// Validate a typed request and produce normalized features
pub fn validate(request: &PredictionRequest) -> Result<CarFeatures, ValidationErrors> {
    check(
        request.brand.as_deref().into(),
        request.mileage.into(),
        request.year.into(),
        request.fuel_type.as_deref().into(),
    )
}

/// Validate a request given as a raw JSON document
///
/// Type errors are reported per field alongside range errors, so a body
/// like `{"mileage": "abc", "year": 3000}` names every offending field.
/// Null counts as missing. Numeric strings are accepted for mileage and
/// year, and year also accepts integral floats such as `2020.0`.
pub fn validate_json(body: &Value) -> Result<CarFeatures, ValidationErrors> {
    let fields = body
        .as_object()
        .ok_or_else(|| ValidationErrors::single("body", "must be a JSON object"))?;

    check(
        string_field(fields, "brand"),
        number_field(fields, "mileage"),
        integer_field(fields, "year"),
        string_field(fields, "fuel_type"),
    )
}

fn present<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|value| !value.is_null())
}

fn string_field<'a>(fields: &'a Map<String, Value>, name: &str) -> Field<&'a str> {
    match present(fields, name) {
        None => Field::Missing,
        Some(Value::String(s)) => Field::Present(s.as_str()),
        Some(_) => Field::Mistyped("must be a string"),
    }
}

fn number_field(fields: &Map<String, Value>, name: &str) -> Field<f64> {
    let parsed = match present(fields, name) {
        None => return Field::Missing,
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    parsed.map_or(Field::Mistyped("must be a number"), Field::Present)
}

fn integer_field(fields: &Map<String, Value>, name: &str) -> Field<i64> {
    let parsed = match present(fields, name) {
        None => return Field::Missing,
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    parsed.map_or(Field::Mistyped("must be an integer"), Field::Present)
}

/// Whole-valued floats only; out-of-range values saturate and fail the range check
fn integral(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}

fn check(
    brand: Field<&str>,
    mileage: Field<f64>,
    year: Field<i64>,
    fuel_type: Field<&str>,
) -> Result<CarFeatures, ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let brand = match brand {
        Field::Missing => {
            errors.push("brand", "field required");
            None
        }
        Field::Mistyped(message) => {
            errors.push("brand", message);
            None
        }
        Field::Present(b) if b.chars().count() < MIN_BRAND_LEN => {
            errors.push(
                "brand",
                format!("Brand name must be at least {} characters", MIN_BRAND_LEN),
            );
            None
        }
        Field::Present(b) => Some(title_case(b)),
    };

    let mileage = match mileage {
        Field::Missing => {
            errors.push("mileage", "field required");
            None
        }
        Field::Mistyped(message) => {
            errors.push("mileage", message);
            None
        }
        Field::Present(m) if !m.is_finite() || m < 0.0 => {
            errors.push("mileage", "must be a finite number >= 0");
            None
        }
        Field::Present(m) => Some(m),
    };

    let year = match year {
        Field::Missing => {
            errors.push("year", "field required");
            None
        }
        Field::Mistyped(message) => {
            errors.push("year", message);
            None
        }
        Field::Present(y) if !(MIN_YEAR..=MAX_YEAR).contains(&y) => {
            errors.push(
                "year",
                format!("must be between {} and {}", MIN_YEAR, MAX_YEAR),
            );
            None
        }
        // Range check above guarantees the value fits
        Field::Present(y) => Some(y as i32),
    };

    let fuel_type = match fuel_type {
        Field::Missing => {
            errors.push("fuel_type", "field required");
            None
        }
        Field::Mistyped(message) => {
            errors.push("fuel_type", message);
            None
        }
        Field::Present(f) => Some(f.to_string()),
    };

    match (brand, mileage, year, fuel_type) {
        (Some(brand), Some(mileage), Some(year), Some(fuel_type)) => {
            Ok(CarFeatures {
                brand,
                mileage,
                year,
                fuel_type,
            })
        }
        _ => Err(errors),
    }
}

/// Title-case each run of letters: first letter upper, rest lower
///
/// Letters whose uppercase form expands keep only its first character,
/// with the rest lowercased, so "ß" becomes "Ss" rather than "SS".
pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_word = false;

    for c in input.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                let mut upper = c.to_uppercase();
                out.extend(upper.next());
                out.extend(upper.flat_map(char::to_lowercase));
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(brand: &str, mileage: f64, year: i64, fuel: &str) -> PredictionRequest {
        PredictionRequest {
            brand: Some(brand.to_string()),
            mileage: Some(mileage),
            year: Some(year),
            fuel_type: Some(fuel.to_string()),
        }
    }

    #[test]
    fn test_brand_is_title_cased() {
        let features = validate(&request("toyota", 50000.0, 2020, "Gasoline")).unwrap();
        assert_eq!(features.brand, "Toyota");
        assert_eq!(features.mileage, 50000.0);
        assert_eq!(features.year, 2020);
        assert_eq!(features.fuel_type, "Gasoline");
    }

    #[test]
    fn test_title_case_rules() {
        assert_eq!(title_case("BMW"), "Bmw");
        assert_eq!(title_case("mercedes-benz"), "Mercedes-Benz");
        assert_eq!(title_case("land rover"), "Land Rover");
        assert_eq!(title_case("vw"), "Vw");
    }

    #[test]
    fn test_title_case_expanding_first_letter() {
        assert_eq!(title_case("ßmw"), "Ssmw");
        assert_eq!(title_case("ß"), "Ss");
        assert_eq!(title_case("straße"), "Straße");
    }

    #[test]
    fn test_short_brand_rejected() {
        let errors = validate(&request("x", 1000.0, 2020, "Diesel")).unwrap_err();
        assert_eq!(errors.fields(), vec!["brand"]);
    }

    #[test]
    fn test_negative_mileage_rejected() {
        let errors = validate(&request("Audi", -1.0, 2020, "Diesel")).unwrap_err();
        assert_eq!(errors.fields(), vec!["mileage"]);
    }

    #[test]
    fn test_zero_mileage_accepted() {
        assert!(validate(&request("Audi", 0.0, 2020, "Diesel")).is_ok());
    }

    #[test]
    fn test_non_finite_mileage_rejected() {
        assert!(validate(&request("Audi", f64::NAN, 2020, "Diesel")).is_err());
        assert!(validate(&request("Audi", f64::INFINITY, 2020, "Diesel")).is_err());
    }

    #[test]
    fn test_year_bounds_inclusive() {
        assert!(validate(&request("Ford", 10.0, 1900, "Diesel")).is_ok());
        assert!(validate(&request("Ford", 10.0, 2026, "Diesel")).is_ok());
        assert!(validate(&request("Ford", 10.0, 1899, "Diesel")).is_err());
        assert!(validate(&request("Ford", 10.0, 2027, "Diesel")).is_err());
    }

    #[test]
    fn test_every_violation_reported() {
        let errors = validate(&request("a", -5.0, 3000, "Hybrid")).unwrap_err();
        assert_eq!(errors.fields(), vec!["brand", "mileage", "year"]);
    }

    #[test]
    fn test_missing_fields_reported() {
        let errors = validate(&PredictionRequest::default()).unwrap_err();
        assert_eq!(errors.fields(), vec!["brand", "mileage", "year", "fuel_type"]);
    }

    #[test]
    fn test_json_type_and_range_errors_together() {
        let body = json!({"brand": "x", "mileage": "abc", "year": 3000});
        let errors = validate_json(&body).unwrap_err();

        assert_eq!(errors.fields(), vec!["brand", "mileage", "year", "fuel_type"]);
        let messages: Vec<&str> = errors.violations().iter().map(|v| v.message.as_str()).collect();
        assert_eq!(messages[1], "must be a number");
        assert_eq!(messages[2], "must be between 1900 and 2026");
        assert_eq!(messages[3], "field required");
    }

    #[test]
    fn test_json_integral_float_year_accepted() {
        let body = json!({"brand": "audi", "mileage": 1200.5, "year": 2020.0, "fuel_type": "Diesel"});
        let features = validate_json(&body).unwrap();
        assert_eq!(features.year, 2020);
        assert_eq!(features.brand, "Audi");
    }

    #[test]
    fn test_json_fractional_year_rejected() {
        let body = json!({"brand": "Audi", "mileage": 1, "year": 2020.5, "fuel_type": "Diesel"});
        let errors = validate_json(&body).unwrap_err();
        assert_eq!(errors.fields(), vec!["year"]);
        assert_eq!(errors.violations()[0].message, "must be an integer");
    }

    #[test]
    fn test_json_numeric_strings_coerced() {
        let body = json!({"brand": "Ford", "mileage": "15000", "year": " 2019 ", "fuel_type": "Gasoline"});
        let features = validate_json(&body).unwrap();
        assert_eq!(features.mileage, 15000.0);
        assert_eq!(features.year, 2019);
    }

    #[test]
    fn test_json_wrong_types_for_strings() {
        let body = json!({"brand": 42, "mileage": 10, "year": 2020, "fuel_type": ["Diesel"]});
        let errors = validate_json(&body).unwrap_err();
        assert_eq!(errors.fields(), vec!["brand", "fuel_type"]);
        assert!(errors.violations().iter().all(|v| v.message == "must be a string"));
    }

    #[test]
    fn test_json_null_counts_as_missing() {
        let body = json!({"brand": null, "mileage": 10, "year": 2020, "fuel_type": "Diesel"});
        let errors = validate_json(&body).unwrap_err();
        assert_eq!(errors.violations()[0].message, "field required");
    }

    #[test]
    fn test_json_body_must_be_object() {
        let errors = validate_json(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(errors.fields(), vec!["body"]);
    }
}
