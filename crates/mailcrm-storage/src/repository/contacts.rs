//! Contact and contact list repository

use crate::db::DatabasePool;
use crate::models::{Contact, ContactList, CreateContact};
use async_trait::async_trait;
use chrono::Utc;
use mailcrm_common::types::{ContactId, ContactListId, OwnerId};
use mailcrm_common::{Error, Result};
use std::collections::HashMap;
use uuid::Uuid;

/// Contact repository trait
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn create(&self, input: CreateContact) -> Result<Contact>;

    /// Get a contact scoped to its owner
    async fn get_by_owner(&self, owner_id: OwnerId, id: ContactId) -> Result<Option<Contact>>;

    /// Owner-scoped contacts for the given ids, in request order without
    /// duplicates; ids that do not resolve are omitted
    async fn list_by_ids(&self, owner_id: OwnerId, ids: &[ContactId]) -> Result<Vec<Contact>>;

    /// Owner contacts whose company is in `companies` and position is in
    /// `positions`; an empty slice leaves that attribute unconstrained
    async fn list_by_filter(
        &self,
        owner_id: OwnerId,
        companies: &[String],
        positions: &[String],
    ) -> Result<Vec<Contact>>;

    async fn create_list(&self, owner_id: OwnerId, name: &str) -> Result<ContactList>;

    /// Add contacts to a list, ignoring ones already present
    async fn add_list_members(&self, list_id: ContactListId, contact_ids: &[ContactId])
        -> Result<u64>;

    /// Members of an owner's list
    async fn list_members(&self, owner_id: OwnerId, list_id: ContactListId)
        -> Result<Vec<Contact>>;

    async fn remove_list_members(&self, list_id: ContactListId, contact_ids: &[ContactId])
        -> Result<u64>;
}

/// Reorder rows to follow `ids`, dropping duplicates
pub(crate) fn order_by_request(ids: &[ContactId], rows: Vec<Contact>) -> Vec<Contact> {
    let mut by_id: HashMap<ContactId, Contact> = rows.into_iter().map(|c| (c.id, c)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

/// Database contact repository
pub struct DbContactRepository {
    pool: DatabasePool,
}

impl DbContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for DbContactRepository {
    async fn create(&self, input: CreateContact) -> Result<Contact> {
        let now = Utc::now();
        sqlx::query_as::<_, Contact>(
            r#"
            INSERT INTO contacts (id, owner_id, name, email, company, position, phone, notes,
                                  created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.company)
        .bind(&input.position)
        .bind(&input.phone)
        .bind(&input.notes)
        .bind(now)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_owner(&self, owner_id: OwnerId, id: ContactId) -> Result<Option<Contact>> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_ids(&self, owner_id: OwnerId, ids: &[ContactId]) -> Result<Vec<Contact>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, Contact>(
            "SELECT * FROM contacts WHERE owner_id = $1 AND id = ANY($2)",
        )
        .bind(owner_id)
        .bind(ids.to_vec())
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(order_by_request(ids, rows))
    }

    async fn list_by_filter(
        &self,
        owner_id: OwnerId,
        companies: &[String],
        positions: &[String],
    ) -> Result<Vec<Contact>> {
        let companies = (!companies.is_empty()).then(|| companies.to_vec());
        let positions = (!positions.is_empty()).then(|| positions.to_vec());

        sqlx::query_as::<_, Contact>(
            r#"
            SELECT * FROM contacts
            WHERE owner_id = $1
              AND ($2::text[] IS NULL OR company = ANY($2))
              AND ($3::text[] IS NULL OR position = ANY($3))
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(owner_id)
        .bind(companies)
        .bind(positions)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn create_list(&self, owner_id: OwnerId, name: &str) -> Result<ContactList> {
        sqlx::query_as::<_, ContactList>(
            "INSERT INTO contact_lists (id, owner_id, name) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(name)
        .fetch_one(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn add_list_members(
        &self,
        list_id: ContactListId,
        contact_ids: &[ContactId],
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO contact_list_members (list_id, contact_id)
            SELECT $1, unnest($2::uuid[])
            ON CONFLICT (list_id, contact_id) DO NOTHING
            "#,
        )
        .bind(list_id)
        .bind(contact_ids.to_vec())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn list_members(
        &self,
        owner_id: OwnerId,
        list_id: ContactListId,
    ) -> Result<Vec<Contact>> {
        sqlx::query_as::<_, Contact>(
            r#"
            SELECT c.* FROM contacts c
            JOIN contact_list_members m ON m.contact_id = c.id
            JOIN contact_lists l ON l.id = m.list_id
            WHERE l.id = $1 AND l.owner_id = $2 AND c.owner_id = $2
            ORDER BY m.added_at ASC, c.id ASC
            "#,
        )
        .bind(list_id)
        .bind(owner_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn remove_list_members(
        &self,
        list_id: ContactListId,
        contact_ids: &[ContactId],
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM contact_list_members
            WHERE list_id = $1 AND contact_id = ANY($2)
            "#,
        )
        .bind(list_id)
        .bind(contact_ids.to_vec())
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
