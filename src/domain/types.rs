//! Shared domain enumerations.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every resource type managed through the lifecycle contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    News,
    Category,
    Tag,
    Agenda,
    Announcement,
    Gallery,
    Facility,
    Role,
    User,
}

impl ResourceKind {
    pub fn all() -> &'static [ResourceKind] {
        &[
            Self::News,
            Self::Category,
            Self::Tag,
            Self::Agenda,
            Self::Announcement,
            Self::Gallery,
            Self::Facility,
            Self::Role,
            Self::User,
        ]
    }

    /// Singular name used in permission strings and audit actions.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Category => "category",
            Self::Tag => "tag",
            Self::Agenda => "agenda",
            Self::Announcement => "announcement",
            Self::Gallery => "gallery",
            Self::Facility => "facility",
            Self::Role => "role",
            Self::User => "user",
        }
    }

    /// Plural name used for routes and cache keys.
    pub fn plural(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Category => "categories",
            Self::Tag => "tags",
            Self::Agenda => "agendas",
            Self::Announcement => "announcements",
            Self::Gallery => "galleries",
            Self::Facility => "facilities",
            Self::Role => "roles",
            Self::User => "users",
        }
    }

    /// Human-readable singular label used in response messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::News => "News",
            Self::Category => "Category",
            Self::Tag => "Tag",
            Self::Agenda => "Agenda",
            Self::Announcement => "Announcement",
            Self::Gallery => "Gallery",
            Self::Facility => "Facility",
            Self::Role => "Role",
            Self::User => "User",
        }
    }

    /// Human-readable plural label used in response messages.
    pub fn display_plural(self) -> &'static str {
        match self {
            Self::News => "News",
            Self::Category => "Categories",
            Self::Tag => "Tags",
            Self::Agenda => "Agendas",
            Self::Announcement => "Announcements",
            Self::Gallery => "Galleries",
            Self::Facility => "Facilities",
            Self::Role => "Roles",
            Self::User => "Users",
        }
    }
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

/// The two cached listing views of a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListView {
    Index,
    Trashed,
}

impl ListView {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Trashed => "trashed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_their_names() {
        for kind in ResourceKind::all() {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(*kind));
        }
        assert!("widget".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn plural_names_match_route_prefixes() {
        assert_eq!(ResourceKind::Category.plural(), "categories");
        assert_eq!(ResourceKind::News.plural(), "news");
        assert_eq!(ResourceKind::Facility.plural(), "facilities");
    }
}
