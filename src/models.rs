use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Application Schemas ---

/// Ingredient
///
/// A single entry of a drink's recipe. The ordering of ingredients inside a recipe is
/// significant: the frontend stacks them bottom-up to draw the cup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Ingredient {
    #[schema(example = "espresso")]
    pub name: String,
    #[schema(example = "#6f4e37")]
    pub color: String,
    /// Relative amount of this ingredient compared to the rest of the recipe.
    #[schema(example = 1)]
    pub parts: i32,
}

/// IngredientSummary
///
/// The public view of an ingredient. Omits the name so that the recipe stays a secret
/// to anyone without the `get:drinks-detail` permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct IngredientSummary {
    pub color: String,
    pub parts: i32,
}

/// Drink
///
/// A menu entry. Serializes as the **long** projection (full recipe detail).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Drink {
    /// Assigned by the store on insert, never reused.
    pub id: i32,
    #[schema(example = "Flat White")]
    pub title: String,
    pub recipe: Vec<Ingredient>,
}

/// DrinkSummary
///
/// The **short** projection of a drink, served on the public listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DrinkSummary {
    pub id: i32,
    pub title: String,
    pub recipe: Vec<IngredientSummary>,
}

impl Drink {
    /// Builds the short projection, dropping ingredient names.
    pub fn short(&self) -> DrinkSummary {
        DrinkSummary {
            id: self.id,
            title: self.title.clone(),
            recipe: self
                .recipe
                .iter()
                .map(|ingredient| IngredientSummary {
                    color: ingredient.color.clone(),
                    parts: ingredient.parts,
                })
                .collect(),
        }
    }
}

/// DrinkRow
///
/// Raw database row for the `drinks` table. The recipe is kept as serialized JSON text
/// and only decoded when converted into a [`Drink`].
#[derive(Debug, Clone, FromRow)]
pub struct DrinkRow {
    pub id: i32,
    pub title: String,
    pub recipe: String,
}

impl TryFrom<DrinkRow> for Drink {
    type Error = serde_json::Error;

    fn try_from(row: DrinkRow) -> Result<Self, Self::Error> {
        Ok(Drink {
            id: row.id,
            title: row.title,
            recipe: serde_json::from_str(&row.recipe)?,
        })
    }
}

/// --- Request Payloads (Input Schemas) ---

/// RecipeInput
///
/// Clients may send the recipe either as a single ingredient object or as the full
/// ingredient list. A single object is wrapped into a one-element list; a list is
/// taken as the intended sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(untagged)]
#[ts(export)]
pub enum RecipeInput {
    Many(Vec<Ingredient>),
    One(Ingredient),
}

impl RecipeInput {
    pub fn into_ingredients(self) -> Vec<Ingredient> {
        match self {
            RecipeInput::Many(ingredients) => ingredients,
            RecipeInput::One(ingredient) => vec![ingredient],
        }
    }
}

/// CreateDrinkRequest
///
/// Input payload for adding a drink to the menu (POST /drinks).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateDrinkRequest {
    pub title: String,
    pub recipe: RecipeInput,
}

/// UpdateDrinkRequest
///
/// Partial update payload (PATCH /drinks/{id}). Only the supplied fields are changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateDrinkRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe: Option<RecipeInput>,
}

/// --- Response Envelopes (Output Schemas) ---

/// DrinkListResponse
///
/// Public listing (GET /drinks).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DrinkListResponse {
    pub success: bool,
    pub drinks: Vec<DrinkSummary>,
}

/// DrinkDetailListResponse
///
/// Detailed listing (GET /drinks-detail) and the result of a PATCH, which wraps the
/// single updated drink in a list.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DrinkDetailListResponse {
    pub success: bool,
    pub drinks: Vec<Drink>,
}

/// DrinkCreatedResponse
///
/// Result of POST /drinks. Note that `drinks` is a single object here, not a list.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DrinkCreatedResponse {
    pub success: bool,
    pub drinks: Drink,
}

/// DeleteDrinkResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DeleteDrinkResponse {
    pub success: bool,
    /// Id of the drink that was removed.
    pub delete: i32,
}
