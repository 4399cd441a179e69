use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{clean_list, list_references};
use crate::application::passwords::hash_password;
use crate::application::repos::ReferenceKind;
use crate::application::resource::{Reference, Resource, UniqueValue};
use crate::domain::entities::{UserRecord, UserSummary};
use crate::domain::permissions::Permission;
use crate::domain::types::ResourceKind;
use crate::domain::validation::{FieldErrors, check_password, is_valid_email, required_message};

const EMAIL: &str = "email";
const PASSWORD: &str = "password";

pub struct Users;

#[derive(Default, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Only read on create; passwords change through the auth endpoints.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub roles: Option<Vec<String>>,
    #[serde(default)]
    pub permissions: Option<Vec<String>>,
}

impl std::fmt::Debug for UserPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPayload")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("roles", &self.roles)
            .field("permissions", &self.permissions)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct UserFields {
    pub name: String,
    pub email: String,
    /// Plain password submitted on create; replaced by `password_hash` in `finalize`.
    pub password: Option<String>,
    /// Argon2id hash; `None` on update.
    pub password_hash: Option<String>,
    /// `None` keeps the current assignment on update.
    pub roles: Option<Vec<String>>,
    /// Direct grants; `None` keeps the current ones on update.
    pub permissions: Option<Vec<Permission>>,
}

impl std::fmt::Debug for UserFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserFields")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("roles", &self.roles)
            .field("permissions", &self.permissions)
            .finish_non_exhaustive()
    }
}

impl Resource for Users {
    const KIND: ResourceKind = ResourceKind::User;
    const DEPENDENTS: &'static [ResourceKind] = &[ResourceKind::News];

    type Record = UserRecord;
    type Summary = UserSummary;
    type Payload = UserPayload;
    type Fields = UserFields;

    fn validate(payload: UserPayload, existing: Option<&UserRecord>) -> Result<UserFields, FieldErrors> {
        let mut errors = FieldErrors::new();
        let name = errors.required("name", payload.name);
        let email = errors.required(EMAIL, payload.email);
        if email.as_deref().is_some_and(|value| !is_valid_email(value)) {
            errors.add(EMAIL, "The email field must be a valid email address.");
        }

        let password = if existing.is_none() {
            match payload.password.filter(|value| !value.is_empty()) {
                Some(password) => {
                    check_password(PASSWORD, &password, &mut errors);
                    Some(password)
                }
                None => {
                    errors.add(PASSWORD, required_message(PASSWORD));
                    None
                }
            }
        } else {
            None
        };

        let (Some(name), Some(email)) = (name, email) else {
            return Err(errors);
        };
        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(UserFields {
            name,
            email,
            password,
            password_hash: None,
            roles: payload.roles.map(clean_list),
            permissions: payload
                .permissions
                .map(|values| clean_list(values).into_iter().map(Permission::new).collect()),
        })
    }

    fn summarize(record: &UserRecord) -> UserSummary {
        UserSummary {
            id: record.id,
            name: record.name.clone(),
            slug: record.slug.clone(),
            email: record.email.clone(),
            roles: record.roles.clone(),
            permissions: record.permissions.clone(),
        }
    }

    fn id(record: &UserRecord) -> Uuid {
        record.id
    }

    fn deleted_at(record: &UserRecord) -> Option<OffsetDateTime> {
        record.deleted_at
    }

    fn unique_values(fields: &UserFields) -> Vec<UniqueValue> {
        vec![UniqueValue {
            field: EMAIL,
            value: fields.email.clone(),
        }]
    }

    fn current_value<'a>(record: &'a UserRecord, field: &str) -> Option<&'a str> {
        (field == EMAIL).then_some(record.email.as_str())
    }

    fn slug_source(fields: &UserFields) -> Option<(&'static str, &str)> {
        Some(("name", fields.name.as_str()))
    }

    fn needs_finalize(fields: &UserFields) -> bool {
        fields.password.is_some()
    }

    fn finalize(mut fields: UserFields) -> Result<UserFields, FieldErrors> {
        let Some(password) = fields.password.take() else {
            return Ok(fields);
        };
        match hash_password(&password) {
            Ok(hash) => {
                fields.password_hash = Some(hash);
                Ok(fields)
            }
            Err(_) => Err(FieldErrors::single(
                PASSWORD,
                "The password could not be processed.",
            )),
        }
    }

    fn references(fields: &UserFields) -> Vec<Reference> {
        let mut references = Vec::new();
        if let Some(roles) = &fields.roles {
            references.extend(list_references(
                "roles",
                ReferenceKind::Role,
                roles.iter().map(String::as_str),
            ));
        }
        if let Some(permissions) = &fields.permissions {
            references.extend(list_references(
                "permissions",
                ReferenceKind::Permission,
                permissions.iter().map(Permission::as_str),
            ));
        }
        references
    }
}
