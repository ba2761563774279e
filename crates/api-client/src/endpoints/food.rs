//! Food lookup endpoints
//!
//! - Search foods by name
//! - Get a single food by ID
//! - Save a custom food (queued while offline)

use crate::client::RequestLayer;
use crate::config::RequestOptions;
use crate::result::ApiResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use url::form_urlencoded;

/// Queue namespace of the food service
pub const SERVICE_NAME: &str = "food";

/// Food API interface
#[derive(Clone)]
pub struct FoodApi {
    layer: Arc<RequestLayer>,
}

impl FoodApi {
    /// Create a food API over its request layer
    pub fn new(layer: Arc<RequestLayer>) -> Self {
        Self { layer }
    }

    /// Underlying request layer
    #[must_use]
    pub fn layer(&self) -> &Arc<RequestLayer> {
        &self.layer
    }

    /// Search foods by name
    ///
    /// GET /foods/search?q=<query>, cached under `food_search_<lowercased query>`
    pub async fn search_foods(&self, query: &str) -> ApiResult<Vec<FoodItem>> {
        let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let options = RequestOptions::new().with_cache_key(search_cache_key(query));
        self.layer
            .get(&format!("/foods/search?q={encoded}"), &options)
            .await
    }

    /// Get a food by ID
    ///
    /// GET /foods/{id}, cached under `food_details_<id>`
    pub async fn get_food_by_id(&self, id: &str) -> ApiResult<FoodItem> {
        let options = RequestOptions::new().with_cache_key(format!("food_details_{id}"));
        self.layer.get(&format!("/foods/{id}"), &options).await
    }

    /// Save a custom food
    ///
    /// POST /foods
    pub async fn save_food(&self, food: &NewFoodItem) -> ApiResult<FoodItem> {
        self.layer
            .post("/foods", food, &RequestOptions::new().with_offline_queue(true))
            .await
    }
}

fn search_cache_key(query: &str) -> String {
    format!("food_search_{}", query.to_lowercase())
}

// ============================================================================
// Types
// ============================================================================

/// A food with its macronutrients per serving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    /// Food ID
    pub id: String,
    /// Display name
    pub name: String,
    /// Energy per serving (kcal)
    pub calories: f64,
    /// Protein (g)
    pub protein: f64,
    /// Carbohydrates (g)
    pub carbs: f64,
    /// Fat (g)
    pub fat: f64,
    /// Serving amount
    pub serving_size: f64,
    /// Serving unit, e.g. `g`
    pub serving_unit: String,
    /// Micronutrients by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrients: Option<HashMap<String, f64>>,
}

/// A food to create; the server assigns the ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFoodItem {
    /// Display name
    pub name: String,
    /// Energy per serving (kcal)
    pub calories: f64,
    /// Protein (g)
    pub protein: f64,
    /// Carbohydrates (g)
    pub carbs: f64,
    /// Fat (g)
    pub fat: f64,
    /// Serving amount
    pub serving_size: f64,
    /// Serving unit
    pub serving_unit: String,
    /// Micronutrients by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrients: Option<HashMap<String, f64>>,
}
