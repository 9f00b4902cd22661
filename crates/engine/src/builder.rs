use trolley_core::{NewItem, RecipeId};

/// Initial contents for a list derived from a recipe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecipeDraft {
    pub title: String,
    pub note: String,
    pub items: Vec<NewItem>,
}

/// Produces the starting item set for a recipe. Consulted once, when the list is created.
pub trait ListBuilder {
    /// `Ok(None)` when the recipe is unknown.
    fn build(
        &self,
        recipe_id: RecipeId,
    ) -> Result<Option<RecipeDraft>, Box<dyn std::error::Error + Send + Sync>>;
}
