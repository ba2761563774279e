//! Nutrition endpoints
//!
//! Meal logging plus daily totals and insights. Reads are cached per user;
//! meal mutations are queued while offline and replayed by the sync
//! coordinator.

use super::food::FoodItem;
use crate::client::RequestLayer;
use crate::config::RequestOptions;
use crate::result::ApiResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use url::form_urlencoded;

/// Queue namespace of the nutrition service
pub const SERVICE_NAME: &str = "nutrition";

/// Nutrition API interface
#[derive(Clone)]
pub struct NutritionApi {
    layer: Arc<RequestLayer>,
}

impl NutritionApi {
    /// Create a nutrition API over its request layer
    pub fn new(layer: Arc<RequestLayer>) -> Self {
        Self { layer }
    }

    /// Underlying request layer
    #[must_use]
    pub fn layer(&self) -> &Arc<RequestLayer> {
        &self.layer
    }

    /// Meals for a user, optionally within a date range
    ///
    /// GET /meals?userId=..&startDate=..&endDate=..
    pub async fn get_meals(
        &self,
        user_id: &str,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> ApiResult<Vec<Meal>> {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("userId", user_id);
        if let Some(start) = start_date {
            query.append_pair("startDate", start);
        }
        if let Some(end) = end_date {
            query.append_pair("endDate", end);
        }

        let cache_key = match (start_date, end_date) {
            (Some(start), Some(end)) => format!("meals_{user_id}_{start}_{end}"),
            _ => format!("meals_{user_id}"),
        };

        self.layer
            .get(
                &format!("/meals?{}", query.finish()),
                &RequestOptions::new().with_cache_key(cache_key),
            )
            .await
    }

    /// Totals for one day
    ///
    /// GET /nutrition/daily?userId=..&date=..
    pub async fn get_daily_nutrition(&self, user_id: &str, date: &str) -> ApiResult<DailyNutrition> {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("userId", user_id)
            .append_pair("date", date)
            .finish();

        self.layer
            .get(
                &format!("/nutrition/daily?{query}"),
                &RequestOptions::new().with_cache_key(format!("daily_nutrition_{user_id}_{date}")),
            )
            .await
    }

    /// Insights for a user
    ///
    /// GET /nutrition/insights?userId=..
    pub async fn get_insights(&self, user_id: &str) -> ApiResult<Vec<NutritionInsight>> {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("userId", user_id)
            .finish();

        self.layer
            .get(
                &format!("/nutrition/insights?{query}"),
                &RequestOptions::new().with_cache_key(format!("insights_{user_id}")),
            )
            .await
    }

    /// Log a meal
    ///
    /// POST /meals
    pub async fn add_meal(&self, meal: &NewMeal) -> ApiResult<Meal> {
        self.layer
            .post("/meals", meal, &RequestOptions::new().with_offline_queue(true))
            .await
    }

    /// Change fields of a meal
    ///
    /// PUT /meals/{id}
    pub async fn update_meal(&self, id: &str, update: &MealUpdate) -> ApiResult<Meal> {
        self.layer
            .put(
                &format!("/meals/{id}"),
                update,
                &RequestOptions::new().with_offline_queue(true),
            )
            .await
    }

    /// Delete a meal
    ///
    /// DELETE /meals/{id}
    pub async fn delete_meal(&self, id: &str) -> ApiResult<bool> {
        self.layer
            .delete(
                &format!("/meals/{id}"),
                &RequestOptions::new().with_offline_queue(true),
            )
            .await
            .map(|_| true)
    }
}

// ============================================================================
// Types
// ============================================================================

/// A logged meal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    /// Meal ID
    pub id: String,
    /// Owner
    pub user_id: String,
    /// Display name
    pub name: String,
    /// ISO 8601 timestamp
    pub date_time: String,
    /// Sum of the foods' calories
    pub total_calories: f64,
    /// Foods eaten
    #[serde(default)]
    pub foods: Vec<FoodItem>,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A meal to log; the server assigns the ID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMeal {
    /// Owner
    pub user_id: String,
    /// Display name
    pub name: String,
    /// ISO 8601 timestamp
    pub date_time: String,
    /// Sum of the foods' calories
    pub total_calories: f64,
    /// Foods eaten
    pub foods: Vec<FoodItem>,
    /// Free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Partial meal update; unset fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealUpdate {
    /// New display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New ISO 8601 timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// New calorie total
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_calories: Option<f64>,
    /// Replacement food list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foods: Option<Vec<FoodItem>>,
    /// New notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Totals for one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyNutrition {
    /// ISO date
    pub date: String,
    /// Energy (kcal)
    pub total_calories: f64,
    /// Protein (g)
    pub total_protein: f64,
    /// Carbohydrates (g)
    pub total_carbs: f64,
    /// Fat (g)
    pub total_fat: f64,
    /// IDs of the meals counted
    #[serde(default)]
    pub meals: Vec<String>,
    /// Micronutrient totals by name
    #[serde(default)]
    pub nutrients: HashMap<String, f64>,
}

/// Kind of nutrition insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    /// Intake below target
    Deficiency,
    /// Intake above target
    Excess,
    /// General advice
    Recommendation,
}

/// Observation about a user's intake
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NutritionInsight {
    /// Insight ID
    pub id: String,
    /// Owner
    pub user_id: String,
    /// Deficiency, excess, or general advice
    #[serde(rename = "type")]
    pub kind: InsightKind,
    /// Nutrient the insight is about
    pub nutrient: String,
    /// Observed intake
    pub value: f64,
    /// Advice shown to the user
    pub recommendation: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, OFFLINE_QUEUED_MESSAGE};
    use crate::testing::{BASE_URL, Harness};
    use caltracker_core::storage::KeyValueStore;
    use serde_json::json;

    fn api(h: &Harness) -> NutritionApi {
        NutritionApi::new(Arc::new(h.layer(SERVICE_NAME)))
    }

    fn lunch() -> NewMeal {
        NewMeal {
            user_id: "u1".into(),
            name: "Lunch".into(),
            date_time: "2026-10-16T12:30:00Z".into(),
            total_calories: 640.0,
            foods: Vec::new(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_add_meal_offline_queues_in_nutrition_namespace() {
        let h = Harness::new(false);
        let api = api(&h);

        match api.add_meal(&lunch()).await {
            ApiResult::Offline(ApiError::Offline(message)) => {
                assert_eq!(message, OFFLINE_QUEUED_MESSAGE);
            }
            other => panic!("expected offline, got {other:?}"),
        }
        assert_eq!(api.layer().queue().len().await.unwrap(), 1);
        assert!(h.store.exists("offline_queue_nutrition").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_meals_cache_keys() {
        let h = Harness::new(true);
        let api = api(&h);
        h.transport.respond(200, "[]");
        h.transport.respond(200, "[]");

        assert!(api.get_meals("u1", None, None).await.is_success());
        assert!(
            api.get_meals("u1", Some("2026-10-01"), Some("2026-10-07"))
                .await
                .is_success()
        );

        assert!(h.store.exists("cache_meals_u1").await.unwrap());
        assert!(h.store.exists("cache_meals_u1_2026-10-01_2026-10-07").await.unwrap());
        assert_eq!(
            h.transport.requests()[1].url,
            format!("{BASE_URL}/meals?userId=u1&startDate=2026-10-01&endDate=2026-10-07")
        );
    }

    #[tokio::test]
    async fn test_daily_nutrition_decodes() {
        let h = Harness::new(true);
        let api = api(&h);
        h.transport.respond(
            200,
            &json!({
                "date": "2026-10-16",
                "totalCalories": 1850,
                "totalProtein": 95,
                "totalCarbs": 210,
                "totalFat": 60,
                "meals": ["m1", "m2"],
                "nutrients": {"fiber": 24}
            })
            .to_string(),
        );

        let daily = api.get_daily_nutrition("u1", "2026-10-16").await.into_data().unwrap();
        assert_eq!(daily.meals, ["m1", "m2"]);
        assert_eq!(daily.nutrients["fiber"], 24.0);
        assert!(h.store.exists("cache_daily_nutrition_u1_2026-10-16").await.unwrap());
    }

    #[tokio::test]
    async fn test_insights_type_field() {
        let h = Harness::new(true);
        let api = api(&h);
        h.transport.respond(
            200,
            r#"[{"id":"i1","userId":"u1","type":"deficiency","nutrient":"iron","value":8,"recommendation":"Add spinach"}]"#,
        );

        let insights = api.get_insights("u1").await.into_data().unwrap();
        assert_eq!(insights[0].kind, InsightKind::Deficiency);
        assert!(h.store.exists("cache_insights_u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_sends_only_set_fields() {
        let h = Harness::new(true);
        let api = api(&h);
        h.transport.respond(
            200,
            r#"{"id":"m1","userId":"u1","name":"Brunch","dateTime":"2026-10-16T11:00:00Z","totalCalories":500}"#,
        );

        let update = MealUpdate {
            name: Some("Brunch".into()),
            ..MealUpdate::default()
        };
        let meal = api.update_meal("m1", &update).await.into_data().unwrap();
        assert_eq!(meal.name, "Brunch");
        assert!(meal.foods.is_empty());

        let sent = &h.transport.requests()[0];
        assert_eq!(sent.body, Some(json!({"name": "Brunch"})));
        assert!(sent.url.ends_with("/meals/m1"));
    }

    #[tokio::test]
    async fn test_delete_meal() {
        let h = Harness::new(true);
        let api = api(&h);
        h.transport.respond(204, "");

        assert_eq!(api.delete_meal("m1").await.into_data(), Some(true));
    }
}
