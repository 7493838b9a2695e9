//! # Roles and Permissions
//!
//! ```text
//! ┌────────────────┬───────┬─────────┬────────┬──────┐
//! │ Permission     │ Admin │ Manager │ Waiter │ Chef │
//! ├────────────────┼───────┼─────────┼────────┼──────┤
//! │ ManageMenu     │   ✓   │    ✓    │        │      │
//! │ ManageTables   │   ✓   │    ✓    │        │      │
//! │ ManageUsers    │   ✓   │         │        │      │
//! │ ManageSettings │   ✓   │    ✓    │        │      │
//! │ TakeOrders     │   ✓   │    ✓    │   ✓    │      │
//! │ TakePayments   │   ✓   │    ✓    │   ✓    │      │
//! │ ViewKitchen    │   ✓   │    ✓    │   ✓    │  ✓   │
//! │ UpdateKitchen  │   ✓   │    ✓    │        │  ✓   │
//! │ ViewReports    │   ✓   │    ✓    │        │      │
//! │ ViewAudit      │   ✓   │    ✓    │        │      │
//! │ Backup         │   ✓   │         │        │      │
//! └────────────────┴───────┴─────────┴────────┴──────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Manager,
    Waiter,
    Chef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    ManageMenu,
    ManageTables,
    ManageUsers,
    ManageSettings,
    TakeOrders,
    TakePayments,
    ViewKitchen,
    UpdateKitchen,
    ViewReports,
    ViewAudit,
    Backup,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Manager => "manager",
            UserRole::Waiter => "waiter",
            UserRole::Chef => "chef",
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        use Permission::*;

        match self {
            UserRole::Admin => true,
            UserRole::Manager => !matches!(permission, ManageUsers | Backup),
            UserRole::Waiter => matches!(permission, TakeOrders | TakePayments | ViewKitchen),
            UserRole::Chef => matches!(permission, ViewKitchen | UpdateKitchen),
        }
    }

    /// Like [`UserRole::can`] but as an error for `?`.
    pub fn require(&self, permission: Permission) -> CoreResult<()> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(CoreError::PermissionDenied {
                role: self.as_str().to_string(),
                permission: permission.to_string(),
            })
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "manager" => Ok(UserRole::Manager),
            "waiter" => Ok(UserRole::Waiter),
            "chef" => Ok(UserRole::Chef),
            _ => Err(ValidationError::NotAllowed {
                field: "role".to_string(),
                allowed: vec![
                    "admin".to_string(),
                    "manager".to_string(),
                    "waiter".to_string(),
                    "chef".to_string(),
                ],
            }),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Permission::ManageMenu => "manage the menu",
            Permission::ManageTables => "manage tables",
            Permission::ManageUsers => "manage users",
            Permission::ManageSettings => "manage settings",
            Permission::TakeOrders => "take orders",
            Permission::TakePayments => "take payments",
            Permission::ViewKitchen => "view the kitchen",
            Permission::UpdateKitchen => "update the kitchen",
            Permission::ViewReports => "view reports",
            Permission::ViewAudit => "view the audit log",
            Permission::Backup => "back up or restore",
        };
        f.write_str(text)
    }
}
