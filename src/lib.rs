/// Duplicate Tab Closer - Chrome Extension background agent
/// Built with Rust + WASM

pub mod agent;
pub mod background;
pub mod counts;
pub mod domain;
pub mod error;
pub mod messages;
pub mod operations;
pub mod presenter;
pub mod scheduler;
pub mod settings;
pub mod suspender;
pub mod tab_cache;
pub mod tab_data;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

// Re-export core functions for the popup and options pages
#[wasm_bindgen(js_name = normalizeUrl)]
pub fn normalize_tab_url(url: Option<String>) -> Option<String> {
    url.map(|url| suspender::normalize_url(&url))
}

#[wasm_bindgen(js_name = extractDomain)]
pub fn extract_domain(url: &str) -> String {
    domain::extract_domain(url)
}
