use crate::snapshot::Keyed;
use vdbkit_schema::RoleName;

/// Access granted to one resource of the virtual database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permission {
    pub resource_name: String,
    pub allow_create: bool,
    pub allow_read: bool,
    pub allow_update: bool,
    pub allow_delete: bool,
    pub allow_execute: bool,
    pub allow_alter: bool,
}

impl Permission {
    pub fn new(resource_name: impl Into<String>) -> Self {
        Self {
            resource_name: resource_name.into(),
            ..Self::default()
        }
    }

    /// Read-only access.
    pub fn read_only(resource_name: impl Into<String>) -> Self {
        Self {
            allow_read: true,
            ..Self::new(resource_name)
        }
    }
}

/// A data role (access policy). Roles are replaced as a whole, never edited
/// in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRole {
    pub name: RoleName,
    pub description: Option<String>,
    pub any_authenticated: bool,
    pub allow_create_temp_tables: bool,
    pub permissions: Vec<Permission>,
    pub mapped_role_names: Vec<String>,
}

impl DataRole {
    pub fn new(name: RoleName) -> Self {
        Self {
            name,
            description: None,
            any_authenticated: false,
            allow_create_temp_tables: false,
            permissions: Vec::new(),
            mapped_role_names: Vec::new(),
        }
    }

    pub fn name(&self) -> &RoleName {
        &self.name
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn with_mapped_role(mut self, role: impl Into<String>) -> Self {
        self.mapped_role_names.push(role.into());
        self
    }
}

impl Keyed for DataRole {
    fn key(&self) -> &str {
        &self.name
    }
}
