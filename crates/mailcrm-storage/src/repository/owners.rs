//! Owner repository

use crate::db::DatabasePool;
use crate::models::{CreateOwner, Owner};
use async_trait::async_trait;
use mailcrm_common::types::OwnerId;
use mailcrm_common::{Error, Result};
use uuid::Uuid;

/// Owner repository trait
#[async_trait]
pub trait OwnerRepository: Send + Sync {
    async fn create(&self, input: CreateOwner) -> Result<Owner>;

    async fn get(&self, id: OwnerId) -> Result<Option<Owner>>;
}

/// Database owner repository
pub struct DbOwnerRepository {
    pool: DatabasePool,
}

impl DbOwnerRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnerRepository for DbOwnerRepository {
    async fn create(&self, input: CreateOwner) -> Result<Owner> {
        sqlx::query_as::<_, Owner>(
            r#"
            INSERT INTO owners (id, name, from_name, from_address)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.from_name)
        .bind(&input.from_address)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get(&self, id: OwnerId) -> Result<Option<Owner>> {
        sqlx::query_as::<_, Owner>("SELECT * FROM owners WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
