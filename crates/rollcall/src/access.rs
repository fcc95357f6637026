//! Role checks for acting profiles.

use tracing::debug;

use crate::error::{Error, Result};
use crate::records::{Profile, Role};
use crate::storage::Storage;

/// Whether `role` may perform actions requiring `required`.
///
/// Admins may act in any role.
#[must_use]
pub fn permits(role: Role, required: Role) -> bool {
    role == Role::Admin || role == required
}

/// Load `profile_id` and check it may act as `required`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] for an unknown profile and
/// [`Error::Unauthorized`] when its role does not permit the action.
pub fn authorize(storage: &Storage, profile_id: i64, required: Role) -> Result<Profile> {
    let profile = storage
        .get_profile(profile_id)?
        .ok_or_else(|| Error::not_found("profile", profile_id))?;

    if !permits(profile.role, required) {
        debug!(
            "Profile {} ({}) denied {} action",
            profile_id, profile.role, required
        );
        return Err(Error::Unauthorized {
            profile_id,
            required,
        });
    }
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permits() {
        assert!(permits(Role::Admin, Role::Admin));
        assert!(permits(Role::Admin, Role::Teacher));
        assert!(permits(Role::Teacher, Role::Teacher));
        assert!(!permits(Role::Teacher, Role::Admin));
    }

    #[test]
    fn test_authorize_admin() {
        let storage = Storage::open_in_memory().unwrap();
        let admin = storage.create_profile(Role::Admin).unwrap();

        assert_eq!(authorize(&storage, admin.id, Role::Admin).unwrap(), admin);
        assert_eq!(authorize(&storage, admin.id, Role::Teacher).unwrap(), admin);
    }

    #[test]
    fn test_authorize_teacher() {
        let storage = Storage::open_in_memory().unwrap();
        let teacher = storage.add_teacher("Ms. Rao", "rao@school.test", "Maths").unwrap();

        let profile = authorize(&storage, teacher.id, Role::Teacher).unwrap();
        assert_eq!(profile.role, Role::Teacher);

        let err = authorize(&storage, teacher.id, Role::Admin).unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[test]
    fn test_authorize_unknown_profile() {
        let storage = Storage::open_in_memory().unwrap();
        let err = authorize(&storage, 99, Role::Teacher).unwrap_err();
        assert!(err.is_not_found());
    }
}
