//! Entities and their optional lifecycle capabilities.
//!
//! The repository accepts any [`Entity`]. Hooks are capabilities an entity may expose
//! through the `as_*` probes. The repository asks for each one right before the matching
//! operation, and a probe returning `None` simply skips the hook.
//!
//! Three composable bases cover the usual identity and audit fields. Each layer's hook
//! runs the layer it wraps first:
//!
//! - [`EntityBase`] holds the identifier.
//! - [`CreationAuditedEntity`] adds creation metadata.
//! - [`AuditedEntity`] adds modification metadata.
//!
//! Embed a base with `#[serde(flatten)]` and route the probes to it, by hand or with
//! `#[derive(Entity)]` from the facade crate.
//!
//! ```ignore
//! #[derive(Debug, Default, Serialize, Deserialize, Entity)]
//! struct Article {
//!     #[serde(flatten)]
//!     #[entity(base)]
//!     audit: AuditedEntity,
//!     title: String,
//! }
//! ```

use bson::{Bson, DateTime, Document, oid::ObjectId};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// The all-zero identifier, never persisted as a real key.
pub const NIL_OBJECT_ID: ObjectId = ObjectId::from_bytes([0; 12]);

pub fn is_nil_object_id(id: &ObjectId) -> bool {
    *id == NIL_OBJECT_ID
}

/// Runs before an entity is inserted.
pub trait BeforeCreate {
    fn before_create(&mut self);
}

/// Runs before a whole-entity update or replacement.
pub trait BeforeUpdate {
    fn before_update(&mut self);
}

/// Validates an entity on request. Never invoked by the repository itself.
pub trait Validation {
    fn validate(&self) -> Result<(), String>;
}

/// A value the repository can persist.
pub trait Entity: Serialize + Send + Sync {
    /// The identifier, or [`NIL_OBJECT_ID`] if none has been assigned yet.
    fn object_id(&self) -> ObjectId;

    fn as_before_create(&mut self) -> Option<&mut dyn BeforeCreate> {
        None
    }

    fn as_before_update(&mut self) -> Option<&mut dyn BeforeUpdate> {
        None
    }

    fn as_validation(&self) -> Option<&dyn Validation> {
        None
    }
}

/// Invokes the pre-create hook if `entity` has one.
pub fn run_before_create<E: Entity + ?Sized>(entity: &mut E) {
    if let Some(hook) = entity.as_before_create() {
        hook.before_create();
    }
}

/// Invokes the pre-update hook if `entity` has one.
pub fn run_before_update<E: Entity + ?Sized>(entity: &mut E) {
    if let Some(hook) = entity.as_before_update() {
        hook.before_update();
    }
}

/// Runs the validation hook of `entity`, if any.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Validation`] with the hook's message verbatim.
pub fn validate<E: Entity + ?Sized>(entity: &E) -> DocumentStoreResult<()> {
    match entity.as_validation() {
        Some(validation) => validation.validate().map_err(DocumentStoreError::Validation),
        None => Ok(()),
    }
}

impl Entity for Document {
    fn object_id(&self) -> ObjectId {
        match self.get("_id") {
            Some(Bson::ObjectId(id)) => *id,
            _ => NIL_OBJECT_ID,
        }
    }
}

/// Identity layer: the `_id` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityBase {
    #[serde(rename = "_id")]
    pub id: ObjectId,
}

impl Default for EntityBase {
    fn default() -> Self {
        Self { id: NIL_OBJECT_ID }
    }
}

impl EntityBase {
    pub fn new(id: ObjectId) -> Self {
        Self { id }
    }
}

impl BeforeCreate for EntityBase {
    fn before_create(&mut self) {
        if is_nil_object_id(&self.id) {
            self.id = ObjectId::new();
        }
    }
}

impl Entity for EntityBase {
    fn object_id(&self) -> ObjectId {
        self.id
    }

    fn as_before_create(&mut self) -> Option<&mut dyn BeforeCreate> {
        Some(self)
    }
}

/// Creation layer: identity plus who created the record and when.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationAuditedEntity {
    #[serde(flatten)]
    pub base: EntityBase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
}

impl CreationAuditedEntity {
    pub fn created_at(&self) -> Option<chrono::DateTime<Utc>> {
        self.creation_time.map(DateTime::to_chrono)
    }
}

impl BeforeCreate for CreationAuditedEntity {
    fn before_create(&mut self) {
        self.base.before_create();

        if self.creation_time.is_none() {
            self.creation_time = Some(DateTime::now());
        }
    }
}

impl Entity for CreationAuditedEntity {
    fn object_id(&self) -> ObjectId {
        self.base.id
    }

    fn as_before_create(&mut self) -> Option<&mut dyn BeforeCreate> {
        Some(self)
    }
}

/// Full audit layer: creation metadata plus the last modification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditedEntity {
    #[serde(flatten)]
    pub creation: CreationAuditedEntity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modification_time: Option<DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modifier_id: Option<String>,
}

impl AuditedEntity {
    pub fn modified_at(&self) -> Option<chrono::DateTime<Utc>> {
        self.last_modification_time.map(DateTime::to_chrono)
    }
}

impl BeforeCreate for AuditedEntity {
    fn before_create(&mut self) {
        self.creation.before_create();
    }
}

impl BeforeUpdate for AuditedEntity {
    fn before_update(&mut self) {
        let now = DateTime::now();

        // Wall clocks can step backwards; the stored value must not.
        self.last_modification_time = Some(match self.last_modification_time {
            Some(previous) if previous > now => previous,
            _ => now,
        });
    }
}

impl Entity for AuditedEntity {
    fn object_id(&self) -> ObjectId {
        self.creation.base.id
    }

    fn as_before_create(&mut self) -> Option<&mut dyn BeforeCreate> {
        Some(self)
    }

    fn as_before_update(&mut self) -> Option<&mut dyn BeforeUpdate> {
        Some(self)
    }
}
