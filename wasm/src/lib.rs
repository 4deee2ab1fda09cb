//! WebAssembly module for the Farm Surveillance Platform
//!
//! Lets the field client work offline:
//! - Sample size calculation
//! - Seasonal stage lookup
//! - Form validation before sync

use rust_decimal::Decimal;
use wasm_bindgen::prelude::*;

pub use shared::models::*;
pub use shared::sampling::*;
pub use shared::validation::*;

/// Initialize the WASM module; panics are reported on the browser console
#[wasm_bindgen(start)]
pub fn init() {
    std::panic::set_hook(Box::new(|info| {
        web_sys::console::error_1(&JsValue::from_str(&info.to_string()));
    }));
}

fn js_error(message: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&message.to_string())
}

/// Required plants for a farm, as a JSON `SampleSizeResult`
#[wasm_bindgen]
pub fn sample_size(total_plants: u32, confidence_percent: u8, prevalence: f64) -> Result<String, JsValue> {
    let confidence = ConfidenceLevel::new(confidence_percent).map_err(js_error)?;
    let result = calculate_sample_size(Some(total_plants as i64), confidence, prevalence)
        .map_err(js_error)?;
    serde_json::to_string(&result).map_err(js_error)
}

/// Confidence levels offered by the calculator
#[wasm_bindgen]
pub fn confidence_levels() -> Vec<u8> {
    ConfidenceLevel::all().map(u8::from).collect()
}

/// Built-in seasonal stage for a month (1-12), as JSON
#[wasm_bindgen]
pub fn stage_for_month(month: u32) -> Result<String, JsValue> {
    validate_month(month).map_err(js_error)?;
    serde_json::to_string(&default_stage_for_month(month)).map_err(js_error)
}

/// Built-in seasonal stage for the device's current month, as JSON
#[wasm_bindgen]
pub fn current_stage() -> Result<String, JsValue> {
    let month = js_sys::Date::new_0().get_month() + 1;
    stage_for_month(month)
}

/// floor(size × stocking rate), or nothing when it cannot be worked out
#[wasm_bindgen]
pub fn farm_total_plants(size_hectares: f64, stocking_rate: i32) -> Option<f64> {
    let size = Decimal::try_from(size_hectares).ok()?;
    total_plants(Some(size), Some(stocking_rate)).map(|n| n as f64)
}

#[wasm_bindgen]
pub fn survey_progress(completed: u32, target: i32) -> i32 {
    progress_percent(completed as i64, Some(target))
}

/// Error message for an invalid contact number
#[wasm_bindgen]
pub fn check_contact_number(phone: &str) -> Option<String> {
    validate_contact_number(phone).err().map(str::to_string)
}

/// Error message for an invalid boundary drawn on the map
#[wasm_bindgen]
pub fn check_boundary(geojson: &str) -> Option<String> {
    parse_polygon(geojson).err().map(|e| e.to_string())
}

/// Error message for an observation position outside WGS84 bounds
#[wasm_bindgen]
pub fn check_coordinates(latitude: f64, longitude: f64) -> Option<String> {
    let (Ok(lat), Ok(lon)) = (Decimal::try_from(latitude), Decimal::try_from(longitude)) else {
        return Some("Coordinates must be numbers".to_string());
    };
    validate_coordinates(lat, lon).err().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_size_json() {
        let json = sample_size(1000, 95, 0.10).unwrap();
        let result: SampleSizeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result.required_plants_to_survey, 122);
        assert_eq!(result.population_size, 1000);
    }

    #[test]
    fn test_confidence_levels() {
        assert_eq!(confidence_levels(), vec![80, 85, 90, 95, 99]);
    }

    #[test]
    fn test_stage_for_month() {
        let json = stage_for_month(7).unwrap();
        let stage: SeasonalStageInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(stage.stage_name, "Flowering");
        assert_eq!(stage.month_used, 7);
    }

    #[test]
    fn test_farm_total_plants() {
        assert_eq!(farm_total_plants(2.5, 100), Some(250.0));
        assert_eq!(farm_total_plants(0.0, 100), None);
    }

    #[test]
    fn test_survey_progress() {
        assert_eq!(survey_progress(61, 122), 50);
        assert_eq!(survey_progress(200, 122), 100);
        assert_eq!(survey_progress(5, 0), 0);
    }

    #[test]
    fn test_form_checks() {
        assert_eq!(check_contact_number("0412 345 678"), None);
        assert!(check_contact_number("12345").is_some());
        assert_eq!(
            check_boundary(""),
            Some("No boundary coordinates received.".to_string())
        );
        assert_eq!(check_coordinates(-12.46, 130.84), None);
        assert!(check_coordinates(95.0, 130.84).is_some());
    }
}
