use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AccountStore, ProjectStore, StoreError};
use crate::models::{Account, NewProject, Project, Role, TeamMember};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS accounts (
        user_id UUID PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        role TEXT NOT NULL,
        disabled BOOLEAN NOT NULL DEFAULT FALSE,
        university TEXT,
        student_id TEXT,
        year INTEGER,
        semester INTEGER,
        major TEXT,
        date_of_birth TEXT,
        github_link TEXT,
        description TEXT,
        profile_image TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS projects (
        id UUID PRIMARY KEY,
        owner_id UUID NOT NULL REFERENCES accounts(user_id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        short_description TEXT,
        long_description TEXT,
        university TEXT,
        tags TEXT[] NOT NULL DEFAULT '{}',
        technologies TEXT[] NOT NULL DEFAULT '{}',
        github_link TEXT,
        website_link TEXT,
        subject TEXT,
        university_year TEXT,
        team_members JSONB NOT NULL DEFAULT '[]',
        thumbnail TEXT,
        source_files TEXT[] NOT NULL DEFAULT '{}',
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS projects_owner_idx ON projects (owner_id, created_at)",
];

/// Opens the pool and makes sure both tables exist.
pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pg = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pg).await?;
    }
    Ok(pg)
}

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    user_id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    disabled: bool,
    university: Option<String>,
    student_id: Option<String>,
    year: Option<i32>,
    semester: Option<i32>,
    major: Option<String>,
    date_of_birth: Option<String>,
    github_link: Option<String>,
    description: Option<String>,
    profile_image: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|_| StoreError::Backend(format!("stored role `{}` is unknown", row.role)))?;
        Ok(Account {
            user_id: row.user_id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            disabled: row.disabled,
            university: row.university,
            student_id: row.student_id,
            year: row.year,
            semester: row.semester,
            major: row.major,
            date_of_birth: row.date_of_birth,
            github_link: row.github_link,
            description: row.description,
            profile_image: row.profile_image,
            created_at: row.created_at,
        })
    }
}

fn into_account(row: Option<AccountRow>) -> Result<Option<Account>, StoreError> {
    row.map(Account::try_from).transpose()
}

pub struct PgAccountStore {
    pg: PgPool,
}

impl PgAccountStore {
    pub fn new(pg: PgPool) -> Self {
        Self { pg }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO accounts VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(account.user_id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(account.disabled)
        .bind(&account.university)
        .bind(&account.student_id)
        .bind(account.year)
        .bind(account.semester)
        .bind(&account.major)
        .bind(&account.date_of_birth)
        .bind(&account.github_link)
        .bind(&account.description)
        .bind(&account.profile_image)
        .bind(account.created_at)
        .execute(&self.pg)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE user_id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pg)
            .await?;
        into_account(row)
    }

    async fn find_by_login(&self, identifier: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT * FROM accounts WHERE email = $1 OR username = $1 \
             ORDER BY (email = $1) DESC LIMIT 1",
        )
        .bind(identifier)
        .fetch_optional(&self.pg)
        .await?;
        into_account(row)
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts ORDER BY created_at")
            .fetch_all(&self.pg)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    async fn update(&self, account: &Account) -> Result<(), StoreError> {
        let res = sqlx::query(
            "UPDATE accounts SET username = $2, email = $3, password_hash = $4, role = $5,
                disabled = $6, university = $7, student_id = $8, year = $9, semester = $10,
                major = $11, date_of_birth = $12, github_link = $13, description = $14,
                profile_image = $15
             WHERE user_id = $1",
        )
        .bind(account.user_id)
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(account.disabled)
        .bind(&account.university)
        .bind(&account.student_id)
        .bind(account.year)
        .bind(account.semester)
        .bind(&account.major)
        .bind(&account.date_of_birth)
        .bind(&account.github_link)
        .bind(&account.description)
        .bind(&account.profile_image)
        .execute(&self.pg)
        .await?;

        if res.rows_affected() < 1 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM accounts WHERE user_id = $1")
            .bind(id)
            .execute(&self.pg)
            .await?;
        if res.rows_affected() < 1 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    short_description: Option<String>,
    long_description: Option<String>,
    university: Option<String>,
    tags: Vec<String>,
    technologies: Vec<String>,
    github_link: Option<String>,
    website_link: Option<String>,
    subject: Option<String>,
    university_year: Option<String>,
    team_members: Json<Vec<TeamMember>>,
    thumbnail: Option<String>,
    source_files: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            id: row.id,
            title: row.title,
            short_description: row.short_description,
            long_description: row.long_description,
            university: row.university,
            tags: row.tags,
            technologies: row.technologies,
            github_link: row.github_link,
            website_link: row.website_link,
            subject: row.subject,
            university_year: row.university_year,
            team_members: row.team_members.0,
            thumbnail: row.thumbnail,
            source_files: row.source_files,
            owner_id: row.owner_id,
            created_at: row.created_at,
        }
    }
}

pub struct PgProjectStore {
    pg: PgPool,
}

impl PgProjectStore {
    pub fn new(pg: PgPool) -> Self {
        Self { pg }
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn insert(&self, project: NewProject) -> Result<Project, StoreError> {
        let project = project.into_project(Uuid::new_v4());
        sqlx::query(
            "INSERT INTO projects (id, owner_id, title, short_description, long_description,
                university, tags, technologies, github_link, website_link, subject,
                university_year, team_members, thumbnail, source_files, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(project.id)
        .bind(project.owner_id)
        .bind(&project.title)
        .bind(&project.short_description)
        .bind(&project.long_description)
        .bind(&project.university)
        .bind(&project.tags)
        .bind(&project.technologies)
        .bind(&project.github_link)
        .bind(&project.website_link)
        .bind(&project.subject)
        .bind(&project.university_year)
        .bind(Json(&project.team_members))
        .bind(&project.thumbnail)
        .bind(&project.source_files)
        .bind(project.created_at)
        .execute(&self.pg)
        .await?;
        Ok(project)
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            "SELECT * FROM projects WHERE owner_id = $1 ORDER BY created_at",
        )
        .bind(owner_id)
        .fetch_all(&self.pg)
        .await?;
        Ok(rows.into_iter().map(Project::from).collect())
    }

    async fn delete_by_owner(&self, owner_id: Uuid) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM projects WHERE owner_id = $1")
            .bind(owner_id)
            .execute(&self.pg)
            .await?;
        Ok(res.rows_affected())
    }
}
