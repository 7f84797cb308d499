//! Account lifecycle: registration, login, profile edits and admin actions.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::auth::{hash_password, verify_password};
use crate::err::Error;
use crate::io::{MediaStore, Upload};
use crate::models::{Account, Role};
use crate::store::{AccountStore, ProjectStore};

const USERNAME_LEN: (usize, usize) = (5, 50);
const PASSWORD_LEN: (usize, usize) = (5, 24);

/// Registration payload as sent by clients and produced by bulk import.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

/// Fields an account holder may change on their own profile.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub student_id: Option<String>,
    pub year: Option<i32>,
    pub semester: Option<i32>,
    pub major: Option<String>,
    pub date_of_birth: Option<String>,
    pub github_link: Option<String>,
    pub description: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.student_id.is_none()
            && self.year.is_none()
            && self.semester.is_none()
            && self.major.is_none()
            && self.date_of_birth.is_none()
            && self.github_link.is_none()
            && self.description.is_none()
    }

    fn validate(&self) -> Result<(), Error> {
        if let Some(username) = &self.username {
            check_username(username.trim())?;
        }
        Ok(())
    }

    fn apply(self, account: &mut Account) {
        if let Some(username) = self.username {
            account.username = username.trim().to_string();
        }
        if let Some(student_id) = self.student_id {
            account.student_id = Some(student_id);
        }
        if let Some(year) = self.year {
            account.year = Some(year);
        }
        if let Some(semester) = self.semester {
            account.semester = Some(semester);
        }
        if let Some(major) = self.major {
            account.major = Some(major);
        }
        if let Some(date_of_birth) = self.date_of_birth {
            account.date_of_birth = Some(date_of_birth);
        }
        if let Some(github_link) = self.github_link {
            account.github_link = Some(github_link);
        }
        if let Some(description) = self.description {
            account.description = Some(description);
        }
    }
}

/// Everything in [`ProfilePatch`] plus the fields only an institution may touch.
#[derive(Debug, Clone, Default)]
pub struct AdminPatch {
    pub profile: ProfilePatch,
    pub email: Option<String>,
    pub role: Option<String>,
    pub university: Option<String>,
    pub disabled: Option<bool>,
}

impl AdminPatch {
    pub fn is_empty(&self) -> bool {
        self.profile.is_empty()
            && self.email.is_none()
            && self.role.is_none()
            && self.university.is_none()
            && self.disabled.is_none()
    }
}

pub fn check_email(email: &str) -> Result<(), Error> {
    let invalid = || Error::bad_request(format!("`{}` is not a valid email address", email));
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    let labels_ok = domain.split('.').all(|label| {
        !label.is_empty() && !label.starts_with('-') && !label.ends_with('-')
    });
    if local.is_empty() || domain.contains('@') || !domain.contains('.') || !labels_ok {
        return Err(invalid());
    }
    Ok(())
}

/// Usernames never contain `@`, so a login identifier cannot name two accounts.
fn check_username(username: &str) -> Result<(), Error> {
    check_length("username", username, USERNAME_LEN)?;
    if username.contains('@') {
        return Err(Error::bad_request("`username` must not contain '@'"));
    }
    Ok(())
}

fn check_length(field: &str, value: &str, (min, max): (usize, usize)) -> Result<(), Error> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(Error::bad_request(format!(
            "`{}` must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    projects: Arc<dyn ProjectStore>,
    media: MediaStore,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        projects: Arc<dyn ProjectStore>,
        media: MediaStore,
    ) -> Self {
        Self {
            accounts,
            projects,
            media,
        }
    }

    pub async fn create_account(&self, candidate: CreateAccount) -> Result<Account, Error> {
        let username = candidate.username.trim().to_string();
        let email = candidate.email.trim().to_string();
        check_username(&username)?;
        check_email(&email)?;
        check_length("password", &candidate.password, PASSWORD_LEN)?;
        let role = candidate.role.parse::<Role>()?;

        let account = Account::new(username, email, hash_password(&candidate.password)?, role);
        self.accounts.insert(&account).await?;
        log::info!(
            "Created {} account `{}` ({})",
            account.role,
            account.username,
            account.user_id
        );
        Ok(account)
    }

    /// Unknown identifiers and wrong passwords fail the same way.
    pub async fn authenticate(&self, identifier: &str, password: &str) -> Result<Account, Error> {
        let rejected = || Error::unauthorized("Incorrect email or password");
        let account = self.accounts.find_by_login(identifier.trim()).await?;

        let Some(account) = account else {
            // Spend comparable time so a missing account is not observable.
            hash_password(password)?;
            log::warn!("Login attempt for unknown identifier");
            return Err(rejected());
        };
        if !verify_password(password, &account.password_hash) {
            log::warn!("Failed login for account {}", account.user_id);
            return Err(rejected());
        }
        if account.disabled {
            log::warn!("Login attempt for disabled account {}", account.user_id);
            return Err(rejected());
        }
        Ok(account)
    }

    pub async fn get(&self, id: Uuid) -> Result<Account, Error> {
        self.accounts
            .get(id)
            .await?
            .ok_or_else(Error::user_not_found)
    }

    pub async fn list(&self) -> Result<Vec<Account>, Error> {
        Ok(self.accounts.list().await?)
    }

    /// Applies only the supplied fields; an optional image replaces the profile picture.
    pub async fn update_profile(
        &self,
        id: Uuid,
        patch: ProfilePatch,
        image: Option<Upload>,
    ) -> Result<Account, Error> {
        patch.validate()?;
        let mut account = self.get(id).await?;
        if patch.is_empty() && image.is_none() {
            return Ok(account);
        }

        patch.apply(&mut account);
        if let Some(image) = image {
            account.profile_image = Some(self.media.save_profile_image(&image).await?);
        }
        self.accounts.update(&account).await?;
        Ok(account)
    }

    pub async fn admin_update(
        &self,
        caller: Role,
        id: Uuid,
        patch: AdminPatch,
    ) -> Result<Account, Error> {
        if !caller.is_elevated() {
            return Err(Error::forbidden());
        }
        patch.profile.validate()?;
        if let Some(email) = &patch.email {
            check_email(email.trim())?;
        }
        let role = patch.role.as_deref().map(str::parse::<Role>).transpose()?;

        let mut account = self.get(id).await?;
        if patch.is_empty() {
            return Ok(account);
        }

        let AdminPatch {
            profile,
            email,
            university,
            disabled,
            ..
        } = patch;
        profile.apply(&mut account);
        if let Some(email) = email {
            account.email = email.trim().to_string();
        }
        if let Some(role) = role {
            account.role = role;
        }
        if let Some(university) = university {
            account.university = Some(university);
        }
        if let Some(disabled) = disabled {
            account.disabled = disabled;
        }
        self.accounts.update(&account).await?;
        log::info!("Account {} edited by an institution", account.user_id);
        Ok(account)
    }

    pub async fn reset_password(
        &self,
        caller: Role,
        id: Uuid,
        new_password: &str,
    ) -> Result<(), Error> {
        if !caller.is_elevated() {
            return Err(Error::forbidden());
        }
        check_length("password", new_password, PASSWORD_LEN)?;
        let mut account = self.get(id).await?;
        account.password_hash = hash_password(new_password)?;
        self.accounts.update(&account).await?;
        log::info!("Password reset for account {}", id);
        Ok(())
    }

    /// Removes the account together with the projects it owns.
    pub async fn delete_account(&self, caller: Role, id: Uuid) -> Result<(), Error> {
        if !caller.is_elevated() {
            return Err(Error::forbidden());
        }
        self.accounts.delete(id).await?;
        let removed = self.projects.delete_by_owner(id).await?;
        log::info!("Deleted account {} and {} owned project(s)", id, removed);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::{MemoryAccountStore, MemoryProjectStore};

    pub(crate) fn service_with(projects: Arc<MemoryProjectStore>) -> AccountService {
        AccountService::new(
            Arc::new(MemoryAccountStore::new()),
            projects,
            MediaStore::new(std::env::temp_dir().join("unirepo-test-media")),
        )
    }

    pub(crate) fn service() -> AccountService {
        service_with(Arc::new(MemoryProjectStore::new()))
    }

    pub(crate) fn candidate(username: &str, email: &str, role: &str) -> CreateAccount {
        CreateAccount {
            username: username.to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            role: role.to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() {
        let accounts = service();
        accounts
            .create_account(candidate("alice1", "alice@example.com", "student"))
            .await
            .unwrap();

        let same_username = accounts
            .create_account(candidate("alice1", "other@example.com", "student"))
            .await;
        assert!(matches!(same_username, Err(Error::Conflict { .. })));

        let same_email = accounts
            .create_account(candidate("alice2", "alice@example.com", "student"))
            .await;
        assert!(matches!(same_email, Err(Error::Conflict { .. })));
        assert_eq!(accounts.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn creation_validates_shape() {
        let accounts = service();
        let short_name = accounts
            .create_account(candidate("abc", "abc@example.com", "student"))
            .await;
        assert!(matches!(short_name, Err(Error::BadRequest { .. })));

        let bad_email = accounts
            .create_account(candidate("valid_name", "not-an-email", "student"))
            .await;
        assert!(matches!(bad_email, Err(Error::BadRequest { .. })));

        let bad_role = accounts
            .create_account(candidate("valid_name", "valid@example.com", "wizard"))
            .await;
        assert!(matches!(bad_role, Err(Error::BadRequest { .. })));

        let mut long_password = candidate("valid_name", "valid@example.com", "student");
        long_password.password = "x".repeat(25);
        assert!(matches!(
            accounts.create_account(long_password).await,
            Err(Error::BadRequest { .. })
        ));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let accounts = service();
        accounts
            .create_account(candidate("alice1", "alice@example.com", "student"))
            .await
            .unwrap();

        let ok = accounts.authenticate("alice@example.com", "secret1").await.unwrap();
        assert_eq!(ok.username, "alice1");
        assert!(accounts.authenticate("alice1", "secret1").await.is_ok());

        let wrong_password = accounts
            .authenticate("alice@example.com", "secret2")
            .await
            .unwrap_err();
        let unknown = accounts
            .authenticate("nobody@example.com", "secret1")
            .await
            .unwrap_err();
        assert!(matches!(wrong_password, Error::Unauthorized { .. }));
        assert_eq!(wrong_password.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn usernames_cannot_shadow_an_email() {
        let accounts = service();
        let owner = accounts
            .create_account(candidate("victim1", "victim@example.com", "student"))
            .await
            .unwrap();

        let shadow = accounts
            .create_account(candidate("victim@example.com", "other@example.com", "student"))
            .await;
        assert!(matches!(shadow, Err(Error::BadRequest { .. })));

        let other = accounts
            .create_account(candidate("other1", "other@example.com", "student"))
            .await
            .unwrap();
        let rename = ProfilePatch {
            username: Some("victim@example.com".to_string()),
            ..ProfilePatch::default()
        };
        assert!(matches!(
            accounts.update_profile(other.user_id, rename.clone(), None).await,
            Err(Error::BadRequest { .. })
        ));
        let admin_rename = AdminPatch {
            profile: rename,
            ..AdminPatch::default()
        };
        assert!(matches!(
            accounts
                .admin_update(Role::Institution, other.user_id, admin_rename)
                .await,
            Err(Error::BadRequest { .. })
        ));

        let resolved = accounts
            .authenticate("victim@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(resolved.user_id, owner.user_id);
    }

    #[tokio::test]
    async fn empty_patch_leaves_profile_untouched() {
        let accounts = service();
        let created = accounts
            .create_account(candidate("alice1", "alice@example.com", "student"))
            .await
            .unwrap();

        let after = accounts
            .update_profile(created.user_id, ProfilePatch::default(), None)
            .await
            .unwrap();
        assert_eq!(after, created);
        assert_eq!(accounts.get(created.user_id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn partial_patch_only_touches_given_fields() {
        let accounts = service();
        let created = accounts
            .create_account(candidate("alice1", "alice@example.com", "student"))
            .await
            .unwrap();

        let patch = ProfilePatch {
            major: Some("Computer Science".to_string()),
            year: Some(2024),
            ..ProfilePatch::default()
        };
        let after = accounts
            .update_profile(created.user_id, patch, None)
            .await
            .unwrap();
        assert_eq!(after.major.as_deref(), Some("Computer Science"));
        assert_eq!(after.year, Some(2024));
        assert_eq!(after.username, created.username);
        assert_eq!(after.semester, None);

        let missing = accounts
            .update_profile(Uuid::new_v4(), ProfilePatch::default(), None)
            .await;
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn profile_image_is_stored_under_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let accounts = AccountService::new(
            Arc::new(MemoryAccountStore::new()),
            Arc::new(MemoryProjectStore::new()),
            MediaStore::new(dir.path()),
        );
        let created = accounts
            .create_account(candidate("alice1", "alice@example.com", "student"))
            .await
            .unwrap();

        let image = Upload {
            file_name: "me.jpg".to_string(),
            bytes: vec![0xff, 0xd8, 0xff],
        };
        let after = accounts
            .update_profile(created.user_id, ProfilePatch::default(), Some(image))
            .await
            .unwrap();
        let path = after.profile_image.unwrap();
        assert!(path.starts_with("/static/profile_pics/"));
        assert!(!path.contains("me.jpg"));
    }

    #[tokio::test]
    async fn students_cannot_use_admin_operations() {
        let accounts = service();
        let target = accounts
            .create_account(candidate("target1", "target@example.com", "student"))
            .await
            .unwrap();

        for id in [target.user_id, Uuid::new_v4()] {
            let edit = accounts
                .admin_update(Role::Student, id, AdminPatch::default())
                .await;
            let reset = accounts.reset_password(Role::Student, id, "newpass").await;
            let delete = accounts.delete_account(Role::Student, id).await;
            assert!(matches!(edit, Err(Error::Forbidden { .. })));
            assert!(matches!(reset, Err(Error::Forbidden { .. })));
            assert!(matches!(delete, Err(Error::Forbidden { .. })));
        }
        assert!(accounts.get(target.user_id).await.is_ok());
    }

    #[tokio::test]
    async fn institutions_manage_accounts() {
        let accounts = service();
        let target = accounts
            .create_account(candidate("target1", "target@example.com", "student"))
            .await
            .unwrap();

        let patch = AdminPatch {
            email: Some("moved@example.com".to_string()),
            role: Some("uni".to_string()),
            ..AdminPatch::default()
        };
        let edited = accounts
            .admin_update(Role::Institution, target.user_id, patch)
            .await
            .unwrap();
        assert_eq!(edited.email, "moved@example.com");
        assert_eq!(edited.role, Role::Institution);

        accounts
            .reset_password(Role::Institution, target.user_id, "brandnew")
            .await
            .unwrap();
        assert!(accounts.authenticate("moved@example.com", "secret1").await.is_err());
        assert!(accounts.authenticate("moved@example.com", "brandnew").await.is_ok());

        accounts
            .delete_account(Role::Institution, target.user_id)
            .await
            .unwrap();
        assert!(matches!(
            accounts.get(target.user_id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            accounts.delete_account(Role::Institution, target.user_id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            accounts
                .reset_password(Role::Institution, target.user_id, "brandnew")
                .await,
            Err(Error::NotFound { .. })
        ));
        let unknown = AdminPatch {
            university: Some("Elsewhere".to_string()),
            ..AdminPatch::default()
        };
        assert!(matches!(
            accounts
                .admin_update(Role::Institution, Uuid::new_v4(), unknown)
                .await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            accounts
                .admin_update(Role::Institution, target.user_id, AdminPatch::default())
                .await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn usernames_are_trimmed_on_update() {
        let accounts = service();
        let created = accounts
            .create_account(candidate("alice1", "alice@example.com", "student"))
            .await
            .unwrap();

        let patch = ProfilePatch {
            username: Some("  spaced_name  ".to_string()),
            ..ProfilePatch::default()
        };
        let after = accounts
            .update_profile(created.user_id, patch, None)
            .await
            .unwrap();
        assert_eq!(after.username, "spaced_name");
        assert!(accounts.authenticate("spaced_name", "secret1").await.is_ok());

        let too_short = ProfilePatch {
            username: Some("  abc   ".to_string()),
            ..ProfilePatch::default()
        };
        assert!(matches!(
            accounts.update_profile(created.user_id, too_short, None).await,
            Err(Error::BadRequest { .. })
        ));
    }

    #[tokio::test]
    async fn disabled_accounts_cannot_log_in() {
        let accounts = service();
        let target = accounts
            .create_account(candidate("target1", "target@example.com", "student"))
            .await
            .unwrap();
        let patch = AdminPatch {
            disabled: Some(true),
            ..AdminPatch::default()
        };
        accounts
            .admin_update(Role::Institution, target.user_id, patch)
            .await
            .unwrap();
        assert!(matches!(
            accounts.authenticate("target1", "secret1").await,
            Err(Error::Unauthorized { .. })
        ));
    }

    #[test]
    fn email_syntax() {
        assert!(check_email("a@b.co").is_ok());
        assert!(check_email("first.last@uni.example.edu").is_ok());
        for bad in ["", "plain", "@b.co", "a@b", "a@@b.co", "a b@c.de", "a@.co", "a@b..co"] {
            assert!(check_email(bad).is_err(), "{bad} should be rejected");
        }
    }
}
