use axum::extract::rejection::{FormRejection, JsonRejection, PathRejection};
use axum::extract::{Multipart, Path};
use axum::{Extension, Form, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts::{AdminPatch, CreateAccount, ProfilePatch};
use crate::auth::{require_elevated, AccessToken, CurrentAccount};
use crate::err::Error;
use crate::import::{import_accounts, ImportReport};
use crate::io::Upload;
use crate::models::{Account, Project};
use crate::projects::CreateProject;
use crate::{proceeds, AppState, Payload};

#[derive(Debug, Clone, Serialize)]
pub struct UserList {
    pub users: Vec<Account>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectList {
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Detail {
    pub detail: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminEditForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub year: Option<String>,
    pub semester: Option<String>,
    pub major: Option<String>,
    pub date_of_birth: Option<String>,
    pub github_link: Option<String>,
    pub description: Option<String>,
    pub university: Option<String>,
    pub role: Option<String>,
    pub disabled: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordForm {
    pub new_password: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn number(field: &str, value: Option<String>) -> Result<Option<i32>, Error> {
    non_empty(value)
        .map(|v| {
            v.parse::<i32>()
                .map_err(|_| Error::bad_request(format!("`{}` must be a whole number", field)))
        })
        .transpose()
}

fn flag(field: &str, value: Option<String>) -> Result<Option<bool>, Error> {
    non_empty(value)
        .map(|v| {
            v.parse::<bool>()
                .map_err(|_| Error::bad_request(format!("`{}` must be true or false", field)))
        })
        .transpose()
}

pub async fn register(
    Extension(app): Extension<AppState>,
    body: Result<Json<CreateAccount>, JsonRejection>,
) -> Payload<Account> {
    let Json(candidate) = body?;
    proceeds(app.accounts.create_account(candidate).await?)
}

pub async fn login(
    Extension(app): Extension<AppState>,
    form: Result<Form<LoginForm>, FormRejection>,
) -> Payload<AccessToken> {
    let Form(login) = form?;
    let account = app.accounts.authenticate(&login.username, &login.password).await?;
    proceeds(app.tokens.issue(account.user_id)?)
}

pub async fn upload_csv(
    Extension(app): Extension<AppState>,
    mut multipart: Multipart,
) -> Payload<ImportReport> {
    let mut file = None;
    let mut default_password = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                file = Some(Upload {
                    file_name,
                    bytes: field.bytes().await?.to_vec(),
                });
            }
            "default_password" => default_password = non_empty(Some(field.text().await?)),
            _ => {}
        }
    }

    let file = file.ok_or_else(|| Error::bad_request("Missing `file` field"))?;
    let default_password =
        default_password.unwrap_or_else(|| app.config.default_import_password.clone());
    proceeds(import_accounts(&app.accounts, &file.file_name, &file.bytes, &default_password).await?)
}

pub async fn me(CurrentAccount(account): CurrentAccount) -> Payload<Account> {
    proceeds(account)
}

pub async fn list_users(Extension(app): Extension<AppState>) -> Payload<UserList> {
    proceeds(UserList {
        users: app.accounts.list().await?,
    })
}

pub async fn update_me(
    Extension(app): Extension<AppState>,
    CurrentAccount(account): CurrentAccount,
    mut multipart: Multipart,
) -> Payload<Account> {
    let mut patch = ProfilePatch::default();
    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "profile_image" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            if !file_name.is_empty() && !bytes.is_empty() {
                image = Some(Upload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = Some(field.text().await?);
        match name.as_str() {
            "username" => patch.username = non_empty(value),
            "student_id" => patch.student_id = non_empty(value),
            "year" => patch.year = number("year", value)?,
            "semester" => patch.semester = number("semester", value)?,
            "major" => patch.major = non_empty(value),
            "date_of_birth" => patch.date_of_birth = non_empty(value),
            "github_link" => patch.github_link = non_empty(value),
            "description" => patch.description = non_empty(value),
            _ => {}
        }
    }

    proceeds(
        app.accounts
            .update_profile(account.user_id, patch, image)
            .await?,
    )
}

pub async fn admin_edit(
    Extension(app): Extension<AppState>,
    CurrentAccount(caller): CurrentAccount,
    user_id: Result<Path<Uuid>, PathRejection>,
    form: Result<Form<AdminEditForm>, FormRejection>,
) -> Payload<Account> {
    require_elevated(&caller)?;
    let Path(user_id) = user_id?;
    let Form(form) = form?;
    let patch = AdminPatch {
        profile: ProfilePatch {
            username: non_empty(form.username),
            student_id: None,
            year: number("year", form.year)?,
            semester: number("semester", form.semester)?,
            major: non_empty(form.major),
            date_of_birth: non_empty(form.date_of_birth),
            github_link: non_empty(form.github_link),
            description: non_empty(form.description),
        },
        email: non_empty(form.email),
        role: non_empty(form.role),
        university: non_empty(form.university),
        disabled: flag("disabled", form.disabled)?,
    };
    proceeds(app.accounts.admin_update(caller.role, user_id, patch).await?)
}

pub async fn admin_delete(
    Extension(app): Extension<AppState>,
    CurrentAccount(caller): CurrentAccount,
    user_id: Result<Path<Uuid>, PathRejection>,
) -> Payload<Detail> {
    require_elevated(&caller)?;
    let Path(user_id) = user_id?;
    app.accounts.delete_account(caller.role, user_id).await?;
    proceeds(Detail {
        detail: format!("User {} deleted successfully", user_id),
    })
}

pub async fn admin_reset_password(
    Extension(app): Extension<AppState>,
    CurrentAccount(caller): CurrentAccount,
    user_id: Result<Path<Uuid>, PathRejection>,
    form: Result<Form<ResetPasswordForm>, FormRejection>,
) -> Payload<Detail> {
    require_elevated(&caller)?;
    let Path(user_id) = user_id?;
    let Form(form) = form?;
    app.accounts
        .reset_password(caller.role, user_id, &form.new_password)
        .await?;
    proceeds(Detail {
        detail: "Password has been reset successfully".to_string(),
    })
}

pub async fn create_project(
    Extension(app): Extension<AppState>,
    CurrentAccount(owner): CurrentAccount,
    body: Result<Json<CreateProject>, JsonRejection>,
) -> Payload<Project> {
    let Json(payload) = body?;
    proceeds(app.projects.create_project(payload, owner.user_id).await?)
}

pub async fn my_projects(
    Extension(app): Extension<AppState>,
    CurrentAccount(owner): CurrentAccount,
) -> Payload<ProjectList> {
    proceeds(ProjectList {
        projects: app.projects.list_my_projects(owner.user_id).await?,
    })
}
