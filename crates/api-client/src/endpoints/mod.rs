//! Feature service endpoints
//!
//! Each module wraps one [`RequestLayer`](crate::client::RequestLayer) with a
//! typed interface. The service name namespaces that layer's offline queue.
//!
//! | Module | Service name | Endpoints |
//! |--------|--------------|-----------|
//! | `nutrition` | `nutrition` | `/meals`, `/nutrition/daily`, `/nutrition/insights` |
//! | `food` | `food` | `/foods`, `/foods/search` |

pub mod food;
pub mod nutrition;

pub use food::{FoodApi, FoodItem, NewFoodItem};
pub use nutrition::{
    DailyNutrition, InsightKind, Meal, MealUpdate, NewMeal, NutritionApi, NutritionInsight,
};
