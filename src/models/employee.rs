use serde::{ Deserialize, Serialize };
use std::fmt;
use std::str::FromStr;

pub type EmployeeId = String;

/// Portal role. Parsed case-insensitively from the directory record; anything
/// outside the four known roles becomes `Unknown` and can message nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Director,
    Hr,
    ProjectManager,
    Employee,
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Director => "director",
            Role::Hr => "hr",
            Role::ProjectManager => "project managers",
            Role::Employee => "employee",
            Role::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "director" => Role::Director,
            "hr" => Role::Hr,
            "project managers" => Role::ProjectManager,
            "employee" => Role::Employee,
            _ => Role::Unknown,
        })
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.parse() {
            Ok(role) => role,
            Err(never) => match never {},
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// Read-only view of a directory record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    pub id: EmployeeId,
    #[serde(default)]
    pub name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub assigned_hr: Option<EmployeeId>,
    #[serde(default)]
    pub assigned_pm: Option<EmployeeId>,
}

impl Employee {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: None,
            role,
            assigned_hr: None,
            assigned_pm: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_hr(mut self, hr: impl Into<String>) -> Self {
        self.assigned_hr = Some(hr.into());
        self
    }

    pub fn with_pm(mut self, pm: impl Into<String>) -> Self {
        self.assigned_pm = Some(pm.into());
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().filter(|n| !n.is_empty()).unwrap_or("Unknown")
    }
}
