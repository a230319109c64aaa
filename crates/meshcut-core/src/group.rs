//! Ownership groups

use serde::{Deserialize, Serialize};

/// Owner metadata attached to a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOwner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// A named ownership group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub owner: GroupOwner,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: GroupOwner::default(),
        }
    }

    pub fn with_owner_name(mut self, owner_name: impl Into<String>) -> Self {
        self.owner.name = Some(owner_name.into());
        self
    }

    pub fn with_owner_email(mut self, owner_email: impl Into<String>) -> Self {
        self.owner.email = Some(owner_email.into());
        self
    }

    /// A group must name at least one way to reach its owner
    pub fn has_owner(&self) -> bool {
        self.owner.name.is_some() || self.owner.email.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_fields() {
        let group = Group::new("finance").with_owner_email("finance@example.com");
        assert!(group.has_owner());
        assert_eq!(group.owner.name, None);
        assert!(!Group::new("empty").has_owner());
    }
}
