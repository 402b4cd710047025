use crate::models::{Drink, DrinkRow, Ingredient};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// StoreError
///
/// Any failure of the persistence layer. Handlers do not inspect the variant: they log it
/// and answer with a generic envelope.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("recipe (de)serialization failed: {0}")]
    Recipe(#[from] serde_json::Error),
    #[error("a drink titled `{0}` already exists")]
    DuplicateTitle(String),
    #[error("title is {0} characters long, over the column limit")]
    TitleTooLong(usize),
    #[error("drink {0} does not exist")]
    Missing(i32),
}

/// Longest title the `drinks.title` column accepts, in characters.
pub const MAX_TITLE_LEN: usize = 80;

/// Title and recipe of the drink inserted by [`Repository::reset_and_seed`].
pub const SEED_DRINK_TITLE: &str = "water";

pub fn seed_recipe() -> Vec<Ingredient> {
    vec![Ingredient {
        name: "water".to_string(),
        color: "blue".to_string(),
        parts: 1,
    }]
}

/// Repository Trait
///
/// Persistence contract for the drinks menu. Absence is never an error: `find_drink`
/// answers `Ok(None)`.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across Axum tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    /// All drinks, ascending by id. Empty when the menu is empty.
    async fn list_drinks(&self) -> Result<Vec<Drink>, StoreError>;
    async fn find_drink(&self, id: i32) -> Result<Option<Drink>, StoreError>;
    /// Persists a new drink; the store assigns the id.
    async fn insert_drink(&self, title: &str, recipe: &[Ingredient]) -> Result<Drink, StoreError>;
    /// Writes back the title and recipe of a previously fetched drink.
    async fn update_drink(&self, drink: &Drink) -> Result<(), StoreError>;
    async fn delete_drink(&self, drink: &Drink) -> Result<(), StoreError>;
    /// Removes every drink and inserts the seed drink. Ids keep counting up.
    async fn reset_and_seed(&self) -> Result<(), StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. The recipe is stored as JSON text.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_drinks(&self) -> Result<Vec<Drink>, StoreError> {
        let rows = sqlx::query_as::<_, DrinkRow>("SELECT id, title, recipe FROM drinks ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        let drinks = rows
            .into_iter()
            .map(Drink::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(drinks)
    }

    async fn find_drink(&self, id: i32) -> Result<Option<Drink>, StoreError> {
        let row = sqlx::query_as::<_, DrinkRow>("SELECT id, title, recipe FROM drinks WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Drink::try_from).transpose()?)
    }

    async fn insert_drink(&self, title: &str, recipe: &[Ingredient]) -> Result<Drink, StoreError> {
        let recipe = serde_json::to_string(recipe)?;
        let row = sqlx::query_as::<_, DrinkRow>(
            "INSERT INTO drinks (title, recipe) VALUES ($1, $2) RETURNING id, title, recipe",
        )
        .bind(title)
        .bind(recipe)
        .fetch_one(&self.pool)
        .await?;

        Ok(Drink::try_from(row)?)
    }

    async fn update_drink(&self, drink: &Drink) -> Result<(), StoreError> {
        let recipe = serde_json::to_string(&drink.recipe)?;
        let result = sqlx::query("UPDATE drinks SET title = $2, recipe = $3 WHERE id = $1")
            .bind(drink.id)
            .bind(&drink.title)
            .bind(recipe)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(drink.id));
        }
        Ok(())
    }

    async fn delete_drink(&self, drink: &Drink) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM drinks WHERE id = $1")
            .bind(drink.id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(drink.id));
        }
        Ok(())
    }

    /// reset_and_seed
    ///
    /// Runs in one transaction. Uses DELETE rather than TRUNCATE ... RESTART IDENTITY so
    /// the id sequence is not rewound.
    async fn reset_and_seed(&self) -> Result<(), StoreError> {
        let recipe = serde_json::to_string(&seed_recipe())?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM drinks").execute(&mut *tx).await?;
        sqlx::query("INSERT INTO drinks (title, recipe) VALUES ($1, $2)")
            .bind(SEED_DRINK_TITLE)
            .bind(recipe)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// MemoryRepository
///
/// In-process `Repository` used by the test suite and by local runs with
/// `DATABASE_URL=memory`. Mirrors the Postgres schema rules: unique titles of at most
/// [`MAX_TITLE_LEN`] characters and ids that are never handed out twice.
#[derive(Default)]
pub struct MemoryRepository {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    last_id: i32,
    drinks: BTreeMap<i32, Drink>,
}

impl MemoryState {
    fn check_title(&self, title: &str, except: Option<i32>) -> Result<(), StoreError> {
        let len = title.chars().count();
        if len > MAX_TITLE_LEN {
            return Err(StoreError::TitleTooLong(len));
        }
        if self.title_taken(title, except) {
            return Err(StoreError::DuplicateTitle(title.to_string()));
        }
        Ok(())
    }

    fn title_taken(&self, title: &str, except: Option<i32>) -> bool {
        self.drinks
            .values()
            .any(|drink| drink.title == title && Some(drink.id) != except)
    }

    fn insert(&mut self, title: &str, recipe: &[Ingredient]) -> Result<Drink, StoreError> {
        self.check_title(title, None)?;
        self.last_id += 1;
        let drink = Drink {
            id: self.last_id,
            title: title.to_string(),
            recipe: recipe.to_vec(),
        };
        self.drinks.insert(drink.id, drink.clone());
        Ok(drink)
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_drinks(&self) -> Result<Vec<Drink>, StoreError> {
        Ok(self.state.read().await.drinks.values().cloned().collect())
    }

    async fn find_drink(&self, id: i32) -> Result<Option<Drink>, StoreError> {
        Ok(self.state.read().await.drinks.get(&id).cloned())
    }

    async fn insert_drink(&self, title: &str, recipe: &[Ingredient]) -> Result<Drink, StoreError> {
        self.state.write().await.insert(title, recipe)
    }

    async fn update_drink(&self, drink: &Drink) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.drinks.contains_key(&drink.id) {
            return Err(StoreError::Missing(drink.id));
        }
        state.check_title(&drink.title, Some(drink.id))?;
        state.drinks.insert(drink.id, drink.clone());
        Ok(())
    }

    async fn delete_drink(&self, drink: &Drink) -> Result<(), StoreError> {
        self.state
            .write()
            .await
            .drinks
            .remove(&drink.id)
            .map(|_| ())
            .ok_or(StoreError::Missing(drink.id))
    }

    async fn reset_and_seed(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.drinks.clear();
        state.insert(SEED_DRINK_TITLE, &seed_recipe())?;
        Ok(())
    }
}
