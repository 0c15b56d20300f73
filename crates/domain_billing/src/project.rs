//! Projects that usage is booked against

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::{ProjectId, UserId};

use crate::error::BillingError;

/// Kind of work a project represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Wetlab,
    Bioinf,
    Training,
}

impl ProjectType {
    /// All types, in the order they appear on documents
    pub const ALL: [ProjectType; 3] = [ProjectType::Wetlab, ProjectType::Bioinf, ProjectType::Training];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectType::Wetlab => "wetlab",
            ProjectType::Bioinf => "bioinf",
            ProjectType::Training => "training",
        }
    }
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "wetlab" => Ok(ProjectType::Wetlab),
            "bioinf" => Ok(ProjectType::Bioinf),
            "training" => Ok(ProjectType::Training),
            other => Err(BillingError::validation(format!(
                "unknown project type '{}', expected wetlab, bioinf or training",
                other
            ))),
        }
    }
}

/// A project owned by a single user
///
/// Identified by (title, type, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub user_id: UserId,
    pub title: String,
    pub project_type: ProjectType,
}

/// A project to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub user_id: UserId,
    pub title: String,
    pub project_type: ProjectType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_type_parsing() {
        assert_eq!("bioinf".parse::<ProjectType>().unwrap(), ProjectType::Bioinf);
        assert!("wet lab".parse::<ProjectType>().is_err());
    }

    #[test]
    fn test_project_type_serde() {
        let json = serde_json::to_string(&ProjectType::Training).unwrap();
        assert_eq!(json, "\"training\"");
    }
}
