use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::err::Error;
use crate::models::{NewProject, Project, TeamMember};
use crate::store::{AccountStore, ProjectStore};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub title: String,
    pub short_description: Option<String>,
    pub long_description: Option<String>,
    pub university: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    pub github_link: Option<String>,
    pub website_link: Option<String>,
    pub subject: String,
    pub university_year: String,
    pub team_members: Vec<TeamMember>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub source_files: Vec<String>,
}

fn required(field: &str, value: String) -> Result<String, Error> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(Error::bad_request(format!("`{}` must not be empty", field)));
    }
    Ok(value)
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = Vec::with_capacity(values.len());
    for value in values {
        let value = value.trim().to_string();
        if !value.is_empty() && !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

impl CreateProject {
    fn validate(self, owner_id: Uuid) -> Result<NewProject, Error> {
        if let Some(member) = self.team_members.iter().find(|m| m.id.trim().is_empty()) {
            return Err(Error::bad_request(format!(
                "Team member {:?} has no id",
                member.name.as_deref().unwrap_or("<unnamed>")
            )));
        }
        Ok(NewProject {
            title: required("title", self.title)?,
            short_description: self.short_description,
            long_description: self.long_description,
            university: self.university,
            tags: dedup(self.tags),
            technologies: dedup(self.technologies),
            github_link: self.github_link,
            website_link: self.website_link,
            subject: required("subject", self.subject)?,
            university_year: required("university_year", self.university_year)?,
            team_members: self.team_members,
            thumbnail: self.thumbnail,
            source_files: self.source_files,
            owner_id,
        })
    }
}

#[derive(Clone)]
pub struct ProjectService {
    projects: Arc<dyn ProjectStore>,
    accounts: Arc<dyn AccountStore>,
}

impl ProjectService {
    pub fn new(projects: Arc<dyn ProjectStore>, accounts: Arc<dyn AccountStore>) -> Self {
        Self { projects, accounts }
    }

    pub async fn create_project(
        &self,
        payload: CreateProject,
        owner_id: Uuid,
    ) -> Result<Project, Error> {
        let project = payload.validate(owner_id)?;
        if self.accounts.get(owner_id).await?.is_none() {
            return Err(Error::NotFound {
                message: format!("Owner {} does not exist", owner_id),
            });
        }
        let project = self.projects.insert(project).await?;
        log::info!("Account {} created project {}", owner_id, project.id);
        Ok(project)
    }

    pub async fn list_my_projects(&self, owner_id: Uuid) -> Result<Vec<Project>, Error> {
        Ok(self.projects.list_by_owner(owner_id).await?)
    }
}
