use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{clean_list, list_references};
use crate::application::repos::ReferenceKind;
use crate::application::resource::{Reference, Resource, UniqueValue};
use crate::domain::entities::{RoleRecord, RoleSummary};
use crate::domain::permissions::Permission;
use crate::domain::types::ResourceKind;
use crate::domain::validation::FieldErrors;

const NAME: &str = "name";

pub struct Roles;

#[derive(Debug, Default, Deserialize)]
pub struct RolePayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleFields {
    pub name: String,
    /// `None` keeps the current grants on update.
    pub permissions: Option<Vec<Permission>>,
}

impl Resource for Roles {
    const KIND: ResourceKind = ResourceKind::Role;
    const DEPENDENTS: &'static [ResourceKind] = &[ResourceKind::User];

    type Record = RoleRecord;
    type Summary = RoleSummary;
    type Payload = RolePayload;
    type Fields = RoleFields;

    fn validate(payload: RolePayload, _existing: Option<&RoleRecord>) -> Result<RoleFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        let permissions = payload
            .permissions
            .map(|values| clean_list(values).into_iter().map(Permission::new).collect());
        match errors.required(NAME, payload.name) {
            Some(name) => Ok(RoleFields { name, permissions }),
            None => Err(errors),
        }
    }

    fn summarize(record: &RoleRecord) -> RoleSummary {
        RoleSummary {
            id: record.id,
            name: record.name.clone(),
            permissions: record.permissions.clone(),
        }
    }

    fn id(record: &RoleRecord) -> Uuid {
        record.id
    }

    fn deleted_at(record: &RoleRecord) -> Option<OffsetDateTime> {
        record.deleted_at
    }

    fn unique_values(fields: &RoleFields) -> Vec<UniqueValue> {
        vec![UniqueValue {
            field: NAME,
            value: fields.name.clone(),
        }]
    }

    fn current_value<'a>(record: &'a RoleRecord, field: &str) -> Option<&'a str> {
        (field == NAME).then_some(record.name.as_str())
    }

    fn references(fields: &RoleFields) -> Vec<Reference> {
        fields
            .permissions
            .as_deref()
            .map(|permissions| {
                list_references(
                    "permissions",
                    ReferenceKind::Permission,
                    permissions.iter().map(Permission::as_str),
                )
            })
            .unwrap_or_default()
    }
}
