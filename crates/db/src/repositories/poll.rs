//! Poll repository.
//!
//! Updates lock the poll row (`SELECT ... FOR UPDATE`) inside a transaction,
//! so concurrent votes on one poll queue up behind each other instead of
//! racing for the same revision.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use livepoll_common::{AppError, AppResult, SessionCode};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, SqlErr, TransactionTrait,
};
use tracing::debug;

use crate::document::{Poll, PollDocument};
use crate::entities::{PollEntity, poll};
use crate::store::{PollMutation, PollStore};

/// Poll repository for database operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn find_model_by_code(&self, code: &SessionCode) -> AppResult<Option<poll::Model>> {
        PollEntity::find()
            .filter(poll::Column::SessionCode.eq(code.as_str()))
            .filter(poll::Column::DeletedAt.is_null())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)
    }
}

fn db_err(e: DbErr) -> AppError {
    AppError::Database(e.to_string())
}

fn to_revision(revision: u64) -> AppResult<i64> {
    i64::try_from(revision).map_err(|_| AppError::Internal(format!("revision overflow: {revision}")))
}

fn to_document(poll: &Poll) -> AppResult<serde_json::Value> {
    serde_json::to_value(PollDocument::from(poll))
        .map_err(|e| AppError::Internal(format!("Failed to encode poll document: {e}")))
}

/// Rebuild the aggregate from its row.
fn to_poll(model: poll::Model) -> AppResult<Poll> {
    let session_code = SessionCode::parse(&model.session_code)
        .map_err(|_| AppError::Database(format!("Corrupt session code on poll {}", model.id)))?;
    let document: PollDocument = serde_json::from_value(model.document)
        .map_err(|e| AppError::Database(format!("Corrupt document on poll {}: {e}", model.id)))?;
    let revision = u64::try_from(model.revision)
        .map_err(|_| AppError::Database(format!("Negative revision on poll {}", model.id)))?;

    Ok(Poll {
        id: model.id,
        session_code,
        title: model.title,
        questions: document.questions,
        voters: document.voters,
        responses: document.responses,
        expires_at: model.expires_at.with_timezone(&Utc),
        is_active: model.is_active,
        created_by: model.created_by,
        created_at: model.created_at.with_timezone(&Utc),
        closed_at: model.closed_at.map(|t| t.with_timezone(&Utc)),
        revision,
    })
}

#[async_trait]
impl PollStore for PollRepository {
    async fn insert(&self, mut poll: Poll) -> AppResult<Poll> {
        poll.revision = 1;
        let now = Utc::now();

        let model = poll::ActiveModel {
            id: Set(poll.id.clone()),
            session_code: Set(poll.session_code.to_string()),
            title: Set(poll.title.clone()),
            created_by: Set(poll.created_by.clone()),
            is_active: Set(poll.is_active),
            expires_at: Set(poll.expires_at.into()),
            closed_at: Set(poll.closed_at.map(Into::into)),
            deleted_at: Set(None),
            revision: Set(1),
            document: Set(to_document(&poll)?),
            created_at: Set(poll.created_at.into()),
            updated_at: Set(now.into()),
        };

        PollEntity::insert(model)
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    AppError::DuplicateSessionCode(poll.session_code.to_string())
                }
                _ => db_err(e),
            })?;

        Ok(poll)
    }

    async fn find_by_session_code(&self, code: &SessionCode) -> AppResult<Option<Poll>> {
        self.find_model_by_code(code).await?.map(to_poll).transpose()
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Poll>> {
        PollEntity::find_by_id(id)
            .filter(poll::Column::DeletedAt.is_null())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .map(to_poll)
            .transpose()
    }

    async fn session_code_exists(&self, code: &SessionCode) -> AppResult<bool> {
        Ok(self.find_model_by_code(code).await?.is_some())
    }

    async fn list_by_owner(&self, owner: &str) -> AppResult<Vec<Poll>> {
        PollEntity::find()
            .filter(poll::Column::CreatedBy.eq(owner))
            .filter(poll::Column::DeletedAt.is_null())
            .order_by_desc(poll::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(to_poll)
            .collect()
    }

    async fn update_if(&self, code: &SessionCode, mutation: PollMutation<'_>) -> AppResult<Poll> {
        // Dropping the transaction on any early return rolls it back and
        // releases the row lock.
        let txn = self.db.begin().await.map_err(db_err)?;

        let model = PollEntity::find()
            .filter(poll::Column::SessionCode.eq(code.as_str()))
            .filter(poll::Column::DeletedAt.is_null())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {code}")))?;
        let current = to_poll(model)?;

        let mut next = current.clone();
        mutation(&mut next)?;
        next.revision = current.revision + 1;

        let result = PollEntity::update_many()
            .col_expr(poll::Column::Document, Expr::value(to_document(&next)?))
            .col_expr(poll::Column::Title, Expr::value(next.title.clone()))
            .col_expr(poll::Column::IsActive, Expr::value(next.is_active))
            .col_expr(
                poll::Column::ClosedAt,
                Expr::value(next.closed_at.map(|t| t.fixed_offset())),
            )
            .col_expr(poll::Column::Revision, Expr::value(to_revision(next.revision)?))
            .col_expr(poll::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(poll::Column::Id.eq(current.id.as_str()))
            .filter(poll::Column::Revision.eq(to_revision(current.revision)?))
            .exec(&txn)
            .await
            .map_err(db_err)?;

        if result.rows_affected != 1 {
            return Err(AppError::Conflict(format!(
                "Poll {code} changed while its row was locked"
            )));
        }

        txn.commit().await.map_err(db_err)?;
        debug!(session_code = %code, revision = next.revision, "Committed poll update");
        Ok(next)
    }

    async fn delete_by_session_code(&self, code: &SessionCode) -> AppResult<bool> {
        let now = Utc::now().fixed_offset();
        let result = PollEntity::update_many()
            .col_expr(poll::Column::DeletedAt, Expr::value(Some(now)))
            .col_expr(poll::Column::UpdatedAt, Expr::value(now))
            .filter(poll::Column::SessionCode.eq(code.as_str()))
            .filter(poll::Column::DeletedAt.is_null())
            .exec(self.db.as_ref())
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected > 0)
    }
}
