//! Shared registry types.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of reference entity resolved through the reference cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Site,
    User,
    Company,
    Department,
}

impl ReferenceKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceKind::Site => "site",
            ReferenceKind::User => "user",
            ReferenceKind::Company => "company",
            ReferenceKind::Department => "department",
        }
    }

    /// Numeric group type used by the registry for organisational groups.
    #[must_use]
    pub fn group_type(&self) -> Option<u8> {
        match self {
            ReferenceKind::Company => Some(5),
            ReferenceKind::Department => Some(2),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "site" => Ok(ReferenceKind::Site),
            "user" => Ok(ReferenceKind::User),
            "company" => Ok(ReferenceKind::Company),
            "department" => Ok(ReferenceKind::Department),
            _ => Err(format!("Unknown reference kind: {s}")),
        }
    }
}

/// User account column used to match source user values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserIdColumn {
    #[default]
    #[serde(rename = "h_user_id")]
    UserId,
    #[serde(rename = "h_login_id")]
    LoginId,
    #[serde(rename = "h_employee_id")]
    EmployeeId,
    #[serde(rename = "h_email")]
    Email,
    #[serde(rename = "h_name")]
    Name,
    #[serde(rename = "h_attrib_1")]
    Attrib1,
}

impl UserIdColumn {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            UserIdColumn::UserId => "h_user_id",
            UserIdColumn::LoginId => "h_login_id",
            UserIdColumn::EmployeeId => "h_employee_id",
            UserIdColumn::Email => "h_email",
            UserIdColumn::Name => "h_name",
            UserIdColumn::Attrib1 => "h_attrib_1",
        }
    }
}

impl std::fmt::Display for UserIdColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for UserIdColumn {
    type Err = String;

    /// Unknown values fall back to `h_user_id`, matching how the registry
    /// treats an unset column.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "h_login_id" => UserIdColumn::LoginId,
            "h_employee_id" => UserIdColumn::EmployeeId,
            "h_email" => UserIdColumn::Email,
            "h_name" => UserIdColumn::Name,
            "h_attrib_1" => UserIdColumn::Attrib1,
            _ => UserIdColumn::UserId,
        })
    }
}

/// A resolved reference entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub kind: ReferenceKind,
    /// Value matched against source data (site name, user column value, group name).
    pub key: String,
    /// Registry identifier (site id, user id, group id).
    pub id: String,
    /// Display name (site name, "first last", group name).
    pub name: String,
}

impl ReferenceEntry {
    #[must_use]
    pub fn new(
        kind: ReferenceKind,
        key: impl Into<String>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            key: key.into(),
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Class and numeric type of an asset type defined in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTypeInfo {
    pub name: String,
    pub class: String,
    pub type_id: i64,
}

/// Filter selecting the registry assets mirrored into the destination cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFilter {
    pub class: String,
    /// 0 selects every type of the class.
    pub type_id: i64,
    /// Column holding the source identifier on the registry side.
    pub identifier_column: String,
}

/// One installed-software row attached to an asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledSoftware {
    pub pk_id: i64,
    pub app_id: String,
    #[serde(default)]
    pub app_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_types() {
        assert_eq!(ReferenceKind::Company.group_type(), Some(5));
        assert_eq!(ReferenceKind::Department.group_type(), Some(2));
        assert_eq!(ReferenceKind::Site.group_type(), None);
    }

    #[test]
    fn test_user_id_column_parse() {
        assert_eq!("H_Email".parse::<UserIdColumn>().unwrap(), UserIdColumn::Email);
        assert_eq!("".parse::<UserIdColumn>().unwrap(), UserIdColumn::UserId);
        assert_eq!(UserIdColumn::Attrib1.as_str(), "h_attrib_1");
    }

    #[test]
    fn test_user_id_column_serde() {
        let col: UserIdColumn = serde_json::from_str("\"h_login_id\"").unwrap();
        assert_eq!(col, UserIdColumn::LoginId);
    }

    #[test]
    fn test_reference_kind_roundtrip_str() {
        for kind in [
            ReferenceKind::Site,
            ReferenceKind::User,
            ReferenceKind::Company,
            ReferenceKind::Department,
        ] {
            assert_eq!(kind.as_str().parse::<ReferenceKind>().unwrap(), kind);
        }
    }
}
