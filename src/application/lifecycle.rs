//! Cache-coherent soft-delete lifecycle shared by every resource type.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::audit::{Actor, AuditService};
use crate::application::blobs::{BlobStore, ImageUpload, StoredBlob, check_image};
use crate::application::cache::{CacheStore, cache_key};
use crate::application::error::AppError;
use crate::application::repos::{
    Draft, PurgeOutcome, ReferenceRepo, RepoError, ResourceRepo,
};
use crate::application::resource::{ImageRule, Resource};
use crate::domain::error::DomainError;
use crate::domain::lifecycle::{LifecycleState, Transition};
use crate::domain::slug::{derive_slug, next_free_slug};
use crate::domain::types::{ListView, ResourceKind};
use crate::domain::validation::{FieldErrors, required_message};
use crate::infra::telemetry::{CACHE_HIT_TOTAL, CACHE_INVALIDATION_TOTAL, CACHE_MISS_TOTAL};

const IMAGE_FIELD: &str = "image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListSource {
    Cache,
    Store,
}

/// A listing together with where it was served from.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub source: ListSource,
}

impl<T> Listing<T> {
    pub fn from_cache(&self) -> bool {
        self.source == ListSource::Cache
    }
}

/// Collaborators shared by every [`ResourceService`].
#[derive(Clone)]
pub struct ServiceContext {
    pub references: Arc<dyn ReferenceRepo>,
    pub cache: Arc<dyn CacheStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub audit: AuditService,
    pub cache_ttl: Duration,
    pub max_image_bytes: u64,
}

pub struct ResourceService<R: Resource> {
    repo: Arc<dyn ResourceRepo<R>>,
    ctx: ServiceContext,
}

impl<R: Resource> Clone for ResourceService<R> {
    fn clone(&self) -> Self {
        Self {
            repo: self.repo.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<R: Resource> ResourceService<R> {
    pub fn new(repo: Arc<dyn ResourceRepo<R>>, ctx: ServiceContext) -> Self {
        Self { repo, ctx }
    }

    pub async fn list(&self) -> Result<Listing<R::Summary>, AppError> {
        self.cached_listing(LifecycleState::Active, ListView::Index)
            .await
    }

    pub async fn list_trashed(&self) -> Result<Listing<R::Summary>, AppError> {
        self.cached_listing(LifecycleState::Trashed, ListView::Trashed)
            .await
    }

    /// An absent or blank query is the same call as [`Self::list`].
    pub async fn search(&self, query: Option<&str>) -> Result<Listing<R::Summary>, AppError> {
        let term = query.map(str::trim).unwrap_or_default();
        if term.is_empty() {
            return self.list().await;
        }

        let records = self.repo.search(term).await?;
        Ok(Listing {
            items: records.iter().map(R::summarize).collect(),
            source: ListSource::Store,
        })
    }

    pub async fn get(&self, id: Uuid) -> Result<R::Record, AppError> {
        self.find_in(id, LifecycleState::Active).await
    }

    pub async fn create(
        &self,
        actor: &Actor,
        payload: R::Payload,
        image: Option<ImageUpload>,
    ) -> Result<R::Record, AppError> {
        let (fields, image) = self.check_submission(payload, image, None).await?;
        let slug = self.slug_for(&fields, None).await?;
        let fields = finalize::<R>(fields).await?;
        let stored = self.store_image(image.as_ref()).await?;

        let draft = Draft {
            fields,
            slug,
            image: stored,
            actor: actor.user_id,
        };

        let record = match self.repo.insert(&draft).await {
            Ok(record) => record,
            Err(err) => {
                self.discard_blob(draft.image.as_ref().map(|blob| blob.path.as_str()))
                    .await;
                return Err(self.write_error(err, &draft.fields));
            }
        };

        self.invalidate(&[ListView::Index]).await?;
        self.record_audit(actor, "create", &record).await;
        Ok(record)
    }

    /// Re-validates the whole payload and always re-derives the slug.
    pub async fn update(
        &self,
        actor: &Actor,
        id: Uuid,
        payload: R::Payload,
        image: Option<ImageUpload>,
    ) -> Result<R::Record, AppError> {
        let existing = self.find_in(id, LifecycleState::Active).await?;
        transition::<R>(&existing, Transition::Update)?;

        let (fields, image) = self
            .check_submission(payload, image, Some(&existing))
            .await?;
        let slug = self.slug_for(&fields, Some(&existing)).await?;
        let fields = finalize::<R>(fields).await?;
        let stored = self.store_image(image.as_ref()).await?;

        let draft = Draft {
            fields,
            slug,
            image: stored,
            actor: actor.user_id,
        };
        let new_blob = draft.image.as_ref().map(|blob| blob.path.as_str());

        let record = match self.repo.update(id, &draft).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.discard_blob(new_blob).await;
                return Err(not_found::<R>());
            }
            Err(err) => {
                self.discard_blob(new_blob).await;
                return Err(self.write_error(err, &draft.fields));
            }
        };

        if new_blob.is_some() {
            self.discard_blob(R::image_path(&existing)).await;
        }

        self.invalidate(&[ListView::Index]).await?;
        self.invalidate_dependents().await?;
        self.record_audit(actor, "update", &record).await;
        Ok(record)
    }

    /// Returns the record as it was before deletion.
    pub async fn delete(&self, actor: &Actor, id: Uuid) -> Result<R::Record, AppError> {
        let record = self.find_in(id, LifecycleState::Active).await?;
        transition::<R>(&record, Transition::SoftDelete)?;

        if !self.repo.soft_delete(id, OffsetDateTime::now_utc()).await? {
            return Err(not_found::<R>());
        }

        self.invalidate(&[ListView::Index, ListView::Trashed])
            .await?;
        self.invalidate_dependents().await?;
        self.record_audit(actor, "delete", &record).await;
        Ok(record)
    }

    pub async fn restore(&self, actor: &Actor, id: Uuid) -> Result<R::Record, AppError> {
        let trashed = self.find_in(id, LifecycleState::Trashed).await?;
        transition::<R>(&trashed, Transition::Restore)?;

        let record = self
            .repo
            .restore(id)
            .await?
            .ok_or_else(not_found::<R>)?;

        self.invalidate(&[ListView::Index, ListView::Trashed])
            .await?;
        self.invalidate_dependents().await?;
        self.record_audit(actor, "restore", &record).await;
        Ok(record)
    }

    /// Physically removes a trashed row. Returns the final snapshot.
    pub async fn force_delete(&self, actor: &Actor, id: Uuid) -> Result<R::Record, AppError> {
        let trashed = self.find_in(id, LifecycleState::Trashed).await?;
        transition::<R>(&trashed, Transition::Purge)?;

        let record = match self.repo.purge(id).await? {
            PurgeOutcome::Purged(record) => record,
            PurgeOutcome::Missing => return Err(not_found::<R>()),
            PurgeOutcome::Referenced { by, count } => {
                return Err(AppError::Conflict(format!(
                    "{} is still referenced by {count} {}",
                    R::KIND.display_name(),
                    by.plural()
                )));
            }
        };

        self.discard_blob(R::image_path(&record)).await;

        self.invalidate(&[ListView::Trashed]).await?;
        self.invalidate_dependents().await?;
        self.record_audit(actor, "forceDelete", &record).await;
        Ok(record)
    }

    /// Drop the listed views of this resource type.
    pub async fn invalidate(&self, views: &[ListView]) -> Result<(), AppError> {
        invalidate_kind(self.ctx.cache.as_ref(), R::KIND, views).await
    }

    async fn invalidate_dependents(&self) -> Result<(), AppError> {
        for kind in R::DEPENDENTS {
            invalidate_kind(
                self.ctx.cache.as_ref(),
                *kind,
                &[ListView::Index, ListView::Trashed],
            )
            .await?;
        }
        Ok(())
    }

    async fn cached_listing(
        &self,
        state: LifecycleState,
        view: ListView,
    ) -> Result<Listing<R::Summary>, AppError> {
        let key = cache_key(R::KIND, view);
        let resource = R::KIND.plural();

        if let Some(cached) = self.ctx.cache.get(&key).await? {
            match serde_json::from_str::<Vec<R::Summary>>(&cached) {
                Ok(items) => {
                    counter!(CACHE_HIT_TOTAL, "resource" => resource).increment(1);
                    return Ok(Listing {
                        items,
                        source: ListSource::Cache,
                    });
                }
                Err(err) => {
                    warn!(
                        target = "schoolboard::cache",
                        key = %key,
                        error = %err,
                        "discarding undecodable cache entry"
                    );
                }
            }
        }

        counter!(CACHE_MISS_TOTAL, "resource" => resource).increment(1);
        let records = self.repo.list(state).await?;
        let items: Vec<R::Summary> = records.iter().map(R::summarize).collect();

        if !items.is_empty() {
            let payload = serde_json::to_string(&items).map_err(|err| {
                AppError::unexpected(format!("failed to encode {resource} listing: {err}"))
            })?;
            self.ctx
                .cache
                .set_with_ttl(&key, &payload, self.ctx.cache_ttl)
                .await?;
        }

        Ok(Listing {
            items,
            source: ListSource::Store,
        })
    }

    async fn find_in(&self, id: Uuid, state: LifecycleState) -> Result<R::Record, AppError> {
        self.repo
            .find(id, state)
            .await?
            .ok_or_else(not_found::<R>)
    }

    /// Run field validation, image checks, uniqueness and reference checks,
    /// reporting every failure together.
    async fn check_submission(
        &self,
        payload: R::Payload,
        image: Option<ImageUpload>,
        existing: Option<&R::Record>,
    ) -> Result<(R::Fields, Option<ImageUpload>), AppError> {
        let mut errors = FieldErrors::new();

        let fields = match R::validate(payload, existing) {
            Ok(fields) => Some(fields),
            Err(field_errors) => {
                errors.merge(field_errors);
                None
            }
        };

        let image = match R::IMAGE {
            ImageRule::None => None,
            rule => {
                match &image {
                    Some(upload) => {
                        check_image(IMAGE_FIELD, upload, self.ctx.max_image_bytes, &mut errors)
                    }
                    None if rule == ImageRule::RequiredOnCreate && existing.is_none() => {
                        errors.add(IMAGE_FIELD, required_message(IMAGE_FIELD));
                    }
                    None => {}
                }
                image
            }
        };

        let Some(fields) = fields else {
            return Err(AppError::Validation(errors));
        };

        self.check_unique(&fields, existing, &mut errors).await?;
        self.check_references(&fields, &mut errors).await?;

        errors
            .finish((fields, image))
            .map_err(AppError::Validation)
    }

    async fn check_unique(
        &self,
        fields: &R::Fields,
        existing: Option<&R::Record>,
        errors: &mut FieldErrors,
    ) -> Result<(), AppError> {
        let excluding = existing.map(R::id);

        for unique in R::unique_values(fields) {
            let unchanged = existing
                .and_then(|record| R::current_value(record, unique.field))
                .is_some_and(|current| current == unique.value);
            if unchanged {
                continue;
            }

            if self
                .repo
                .value_exists(unique.field, &unique.value, excluding)
                .await?
            {
                errors.taken(unique.field);
            }
        }

        Ok(())
    }

    async fn check_references(
        &self,
        fields: &R::Fields,
        errors: &mut FieldErrors,
    ) -> Result<(), AppError> {
        for reference in R::references(fields) {
            if !self
                .ctx
                .references
                .exists(reference.kind, &reference.value)
                .await?
            {
                errors.invalid_selection(&reference.field);
            }
        }
        Ok(())
    }

    async fn slug_for(
        &self,
        fields: &R::Fields,
        existing: Option<&R::Record>,
    ) -> Result<Option<String>, AppError> {
        let Some((field, source)) = R::slug_source(fields) else {
            return Ok(None);
        };

        let base = derive_slug(source).map_err(|_| {
            AppError::from(FieldErrors::single(
                field,
                format!("The {field} field must contain letters or numbers."),
            ))
        })?;

        let taken: HashSet<String> = self
            .repo
            .slug_family(&base, existing.map(R::id))
            .await?
            .into_iter()
            .collect();
        Ok(Some(next_free_slug(&base, |candidate| {
            taken.contains(candidate)
        })))
    }

    async fn store_image(
        &self,
        image: Option<&ImageUpload>,
    ) -> Result<Option<StoredBlob>, AppError> {
        match image {
            Some(upload) => Ok(Some(self.ctx.blobs.put(R::KIND.plural(), upload).await?)),
            None => Ok(None),
        }
    }

    /// Best-effort removal; the row write it belongs to has already been decided.
    async fn discard_blob(&self, path: Option<&str>) {
        let Some(path) = path else {
            return;
        };
        if let Err(err) = self.ctx.blobs.delete(path).await {
            warn!(
                target = "schoolboard::blobs",
                resource = R::KIND.as_str(),
                path = path,
                error = %err,
                "failed to delete stored image"
            );
        }
    }

    /// Unique-constraint races that slip past validation become field errors.
    fn write_error(&self, err: RepoError, fields: &R::Fields) -> AppError {
        match err {
            RepoError::Duplicate { constraint } => {
                let field = R::unique_values(fields)
                    .into_iter()
                    .map(|unique| unique.field)
                    .find(|field| constraint.contains(field))
                    .unwrap_or("slug");
                let mut errors = FieldErrors::new();
                errors.taken(field);
                AppError::Validation(errors)
            }
            other => AppError::Repo(other),
        }
    }

    async fn record_audit(&self, actor: &Actor, action: &str, record: &R::Record) {
        let summary = R::summarize(record);
        self.ctx
            .audit
            .record(
                &actor.label,
                &format!("{}.{action}", R::KIND.as_str()),
                R::KIND.as_str(),
                Some(&R::id(record).to_string()),
                Some(&summary),
            )
            .await;
    }
}

/// Drop cached views of `kind` in one batched request.
pub async fn invalidate_kind(
    cache: &dyn CacheStore,
    kind: ResourceKind,
    views: &[ListView],
) -> Result<(), AppError> {
    let keys: Vec<String> = views.iter().map(|view| cache_key(kind, *view)).collect();
    match keys.as_slice() {
        [] => return Ok(()),
        [key] => cache.delete(key).await?,
        _ => cache.delete_many(&keys).await?,
    }

    counter!(CACHE_INVALIDATION_TOTAL, "resource" => kind.plural()).increment(keys.len() as u64);
    debug!(
        target = "schoolboard::cache",
        keys = ?keys,
        "invalidated listing cache"
    );
    Ok(())
}

async fn finalize<R: Resource>(fields: R::Fields) -> Result<R::Fields, AppError> {
    if !R::needs_finalize(&fields) {
        return Ok(fields);
    }
    tokio::task::spawn_blocking(move || R::finalize(fields))
        .await
        .map_err(|err| AppError::unexpected(format!("finalize task failed: {err}")))?
        .map_err(AppError::Validation)
}

fn not_found<R: Resource>() -> AppError {
    AppError::not_found(R::KIND.display_name())
}

fn transition<R: Resource>(record: &R::Record, step: Transition) -> Result<LifecycleState, AppError> {
    LifecycleState::of(R::deleted_at(record))
        .apply(step)
        .map_err(|err| AppError::Domain(DomainError::from(err)))
}
