//! Permission strings and the role/permission/user authorization graph.
//!
//! Permissions are granted to roles and to users directly; users hold roles.
//! Resolving what an actor may do is a pure function over an
//! [`AuthorizationSnapshot`] loaded from the store once per request.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::types::ResourceKind;

/// Lifecycle action a protected route declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Trashed,
    Restore,
    ForceDelete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Trashed => "trashed",
            Self::Restore => "restore",
            Self::ForceDelete => "forceDelete",
        }
    }

    pub const CRUD: [Action; 4] = [Self::Create, Self::Read, Self::Update, Self::Delete];
    pub const LIFECYCLE: [Action; 3] = [Self::Trashed, Self::Restore, Self::ForceDelete];
}

/// A permission name of the form `<subject>.<action>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn of(kind: ResourceKind, action: Action) -> Self {
        Self(format!("{}.{}", kind.as_str(), action.as_str()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Permission {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

const CRUD_SUBJECTS: &[&str] = &[
    "user",
    "category",
    "agenda",
    "announcement",
    "news",
    "news-tag",
    "tag",
    "gallery",
    "facility",
    "role",
    "permission",
];

const LIFECYCLE_SUBJECTS: &[&str] = &[
    "category",
    "agenda",
    "announcement",
    "news",
    "user",
    "tag",
    "gallery",
    "facility",
    "role",
];

const DASHBOARD_PERMISSIONS: &[&str] = &[
    "dashboard.read",
    "dashboard.superAdmin",
    "dashboard.admin",
    "dashboard.writer",
    "log.read",
];

pub const SUPER_ADMIN_ROLE: &str = "Super Admin";
pub const ADMIN_ROLE: &str = "Admin";
pub const WRITER_ROLE: &str = "Writer";

/// Every permission the system knows about, in seeding order.
pub fn catalogue() -> Vec<Permission> {
    let crud = CRUD_SUBJECTS.iter().flat_map(|subject| {
        Action::CRUD
            .into_iter()
            .map(move |action| Permission::new(format!("{subject}.{}", action.as_str())))
    });
    let lifecycle = LIFECYCLE_SUBJECTS.iter().flat_map(|subject| {
        Action::LIFECYCLE
            .into_iter()
            .map(move |action| Permission::new(format!("{subject}.{}", action.as_str())))
    });
    crud.chain(lifecycle)
        .chain(DASHBOARD_PERMISSIONS.iter().copied().map(Permission::from))
        .collect()
}

/// The built-in roles with the permissions each is seeded with.
pub fn default_roles() -> Vec<(&'static str, Vec<Permission>)> {
    let all = catalogue();

    let admin = all
        .iter()
        .filter(|permission| !admin_excludes(permission.as_str()))
        .cloned()
        .collect();

    let writer = [
        "dashboard.read",
        "dashboard.writer",
        "news.create",
        "news.read",
        "news.update",
        "news.delete",
    ]
    .into_iter()
    .map(Permission::from)
    .collect();

    vec![
        (SUPER_ADMIN_ROLE, all),
        (ADMIN_ROLE, admin),
        (WRITER_ROLE, writer),
    ]
}

fn admin_excludes(name: &str) -> bool {
    if name.starts_with("role.") || name.ends_with(".forceDelete") {
        return true;
    }
    matches!(
        name,
        "dashboard.superAdmin"
            | "dashboard.writer"
            | "log.read"
            | "user.update"
            | "user.delete"
            | "user.trashed"
            | "user.restore"
    )
}

/// A role as seen from one user: its name, grants and whether it is still active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub name: String,
    pub permissions: Vec<Permission>,
    pub active: bool,
}

/// Everything needed to answer permission questions for one actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationSnapshot {
    pub direct: Vec<Permission>,
    pub roles: Vec<RoleGrant>,
}

/// Union of direct grants and the grants of every active role.
pub fn resolve_permissions(snapshot: &AuthorizationSnapshot) -> BTreeSet<Permission> {
    snapshot
        .roles
        .iter()
        .filter(|role| role.active)
        .flat_map(|role| role.permissions.iter())
        .chain(snapshot.direct.iter())
        .cloned()
        .collect()
}

pub fn has_permission(snapshot: &AuthorizationSnapshot, needed: &Permission) -> bool {
    snapshot.direct.contains(needed)
        || snapshot
            .roles
            .iter()
            .any(|role| role.active && role.permissions.contains(needed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(name: &str, permissions: &[&str], active: bool) -> RoleGrant {
        RoleGrant {
            name: name.to_string(),
            permissions: permissions.iter().copied().map(Permission::from).collect(),
            active,
        }
    }

    #[test]
    fn permission_names_follow_resource_and_action() {
        assert_eq!(
            Permission::of(ResourceKind::Category, Action::ForceDelete).as_str(),
            "category.forceDelete"
        );
        assert_eq!(
            Permission::of(ResourceKind::News, Action::Read).as_str(),
            "news.read"
        );
    }

    #[test]
    fn catalogue_covers_every_route_permission() {
        let all = catalogue();
        for kind in ResourceKind::all() {
            for action in Action::CRUD.into_iter().chain(Action::LIFECYCLE) {
                let needed = Permission::of(*kind, action);
                assert!(all.contains(&needed), "missing {needed}");
            }
        }
        let unique: BTreeSet<_> = all.iter().collect();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn resolution_unions_direct_and_role_grants() {
        let snapshot = AuthorizationSnapshot {
            direct: vec![Permission::from("log.read")],
            roles: vec![
                grant("Writer", &["news.read", "news.create"], true),
                grant("Editor", &["news.read", "tag.read"], true),
            ],
        };
        let resolved: Vec<_> = resolve_permissions(&snapshot)
            .into_iter()
            .map(|p| p.as_str().to_string())
            .collect();
        assert_eq!(
            resolved,
            vec!["log.read", "news.create", "news.read", "tag.read"]
        );
        assert!(has_permission(&snapshot, &Permission::from("tag.read")));
        assert!(!has_permission(&snapshot, &Permission::from("tag.delete")));
    }

    #[test]
    fn trashed_roles_grant_nothing() {
        let snapshot = AuthorizationSnapshot {
            direct: Vec::new(),
            roles: vec![grant("Writer", &["news.read"], false)],
        };
        assert!(resolve_permissions(&snapshot).is_empty());
        assert!(!has_permission(&snapshot, &Permission::from("news.read")));
    }

    #[test]
    fn default_roles_match_seeded_policy() {
        let roles = default_roles();
        let find = |name: &str| {
            roles
                .iter()
                .find(|(role, _)| *role == name)
                .map(|(_, permissions)| permissions.clone())
                .unwrap()
        };

        assert_eq!(find(SUPER_ADMIN_ROLE).len(), catalogue().len());

        let admin = find(ADMIN_ROLE);
        assert!(admin.contains(&Permission::from("user.create")));
        assert!(admin.contains(&Permission::from("category.restore")));
        assert!(!admin.contains(&Permission::from("role.read")));
        assert!(!admin.contains(&Permission::from("user.update")));
        assert!(!admin.contains(&Permission::from("news.forceDelete")));
        assert!(!admin.contains(&Permission::from("log.read")));

        let writer = find(WRITER_ROLE);
        assert_eq!(writer.len(), 6);
        assert!(writer.contains(&Permission::from("news.update")));
    }
}
