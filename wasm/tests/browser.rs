//! Bindings that need a JavaScript host; run with `wasm-pack test --headless --firefox`

#![cfg(target_arch = "wasm32")]

use farm_surveillance_wasm::{current_stage, sample_size, SeasonalStageInfo};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn current_stage_uses_device_month() {
    let month = js_sys::Date::new_0().get_month() + 1;
    let stage: SeasonalStageInfo = serde_json::from_str(&current_stage().unwrap()).unwrap();
    assert_eq!(stage.month_used, month);
}

#[wasm_bindgen_test]
fn unsupported_confidence_is_a_js_error() {
    let err = sample_size(500, 70, 0.1).unwrap_err();
    assert_eq!(err.as_string().as_deref(), Some("Unsupported confidence level: 70%"));
}
