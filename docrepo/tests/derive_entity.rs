use docrepo::{
    bson::oid::ObjectId,
    entity::{NIL_OBJECT_ID, run_before_create, run_before_update, validate},
    prelude::*,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize, Entity)]
struct Note {
    #[serde(flatten)]
    #[entity(base)]
    audit: AuditedEntity,
    body: String,
}

#[derive(Debug, Default, Serialize, Deserialize, Entity)]
struct Stamp {
    #[serde(flatten)]
    #[entity(base)]
    creation: CreationAuditedEntity,
}

#[derive(Debug, Serialize, Deserialize, Entity)]
struct Tag {
    #[serde(rename = "_id")]
    #[entity(id)]
    id: ObjectId,
    label: String,
}

#[derive(Debug, Default, Serialize, Deserialize, Entity)]
#[entity(validate)]
struct Invoice {
    #[serde(flatten)]
    #[entity(base)]
    base: EntityBase,
    total: i64,
}

impl Validation for Invoice {
    fn validate(&self) -> Result<(), String> {
        if self.total < 0 {
            return Err(format!("total must not be negative, got {}", self.total));
        }
        Ok(())
    }
}

#[test]
fn base_field_supplies_identity_and_hooks() {
    let mut note = Note::default();
    assert_eq!(note.object_id(), NIL_OBJECT_ID);

    run_before_create(&mut note);
    let id = note.object_id();
    assert_ne!(id, NIL_OBJECT_ID);
    assert!(note.audit.creation.created_at().is_some());
    assert!(note.audit.modified_at().is_none());

    run_before_create(&mut note);
    assert_eq!(note.object_id(), id);

    run_before_update(&mut note);
    assert!(note.audit.modified_at().is_some());
}

#[test]
fn creation_base_has_no_update_hook() {
    let mut stamp = Stamp::default();

    run_before_create(&mut stamp);
    assert!(stamp.creation.creation_time.is_some());

    assert!(stamp.as_before_update().is_none());
}

#[test]
fn id_field_only_supplies_identity() {
    let id = ObjectId::new();
    let mut tag = Tag { id, label: "rust".into() };

    assert_eq!(tag.object_id(), id);
    assert!(tag.as_before_create().is_none());
    assert!(tag.as_before_update().is_none());
    assert!(tag.as_validation().is_none());
}

#[test]
fn validation_routes_to_the_entity() {
    let valid = Invoice { total: 10, ..Default::default() };
    assert!(validate(&valid).is_ok());

    let invalid = Invoice { total: -3, ..Default::default() };
    let error = validate(&invalid).unwrap_err();
    assert!(matches!(error, DocumentStoreError::Validation(ref message) if message == "total must not be negative, got -3"));

    assert!(validate(&Note::default()).is_ok());
}

#[test]
fn validation_is_not_run_on_write_hooks() {
    let mut invoice = Invoice { total: -1, ..Default::default() };

    run_before_create(&mut invoice);

    assert_ne!(invoice.object_id(), NIL_OBJECT_ID);
    assert_eq!(invoice.total, -1);
}
