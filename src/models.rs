use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::err::Error;

/// Privilege level of an account.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "student")]
    Student,
    /// Institution accounts administer other accounts.
    #[serde(rename = "uni", alias = "institution")]
    Institution,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Institution => "uni",
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Institution)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "uni" | "institution" => Ok(Role::Institution),
            other => Err(Error::bad_request(format!("Unknown role `{}`", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Account {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub disabled: bool,
    pub university: Option<String>,
    pub student_id: Option<String>,
    pub year: Option<i32>,
    pub semester: Option<i32>,
    pub major: Option<String>,
    pub date_of_birth: Option<String>,
    pub github_link: Option<String>,
    pub description: Option<String>,
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(username: String, email: String, password_hash: String, role: Role) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            role,
            disabled: false,
            university: None,
            student_id: None,
            year: None,
            semester: None,
            major: None,
            date_of_birth: None,
            github_link: None,
            description: None,
            profile_image: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamMember {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub university: Option<String>,
    pub tags: Vec<String>,
    pub technologies: Vec<String>,
    pub github_link: Option<String>,
    pub website_link: Option<String>,
    pub subject: Option<String>,
    pub university_year: Option<String>,
    pub team_members: Vec<TeamMember>,
    pub thumbnail: Option<String>,
    pub source_files: Vec<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A validated project waiting for the store to assign its identifier.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub university: Option<String>,
    pub tags: Vec<String>,
    pub technologies: Vec<String>,
    pub github_link: Option<String>,
    pub website_link: Option<String>,
    pub subject: String,
    pub university_year: String,
    pub team_members: Vec<TeamMember>,
    pub thumbnail: Option<String>,
    pub source_files: Vec<String>,
    pub owner_id: Uuid,
}

impl NewProject {
    pub fn into_project(self, id: Uuid) -> Project {
        Project {
            id,
            title: self.title,
            short_description: self.short_description,
            long_description: self.long_description,
            university: self.university,
            tags: self.tags,
            technologies: self.technologies,
            github_link: self.github_link,
            website_link: self.website_link,
            subject: Some(self.subject),
            university_year: Some(self.university_year),
            team_members: self.team_members,
            thumbnail: self.thumbnail,
            source_files: self.source_files,
            owner_id: self.owner_id,
            created_at: Utc::now(),
        }
    }
}
