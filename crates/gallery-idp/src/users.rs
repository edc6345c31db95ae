//! Local user accounts

use subtle::ConstantTimeEq;

use crate::model::TestUser;

/// In-memory user store backed by the configured accounts
pub struct UserStore {
    users: Vec<TestUser>,
}

impl UserStore {
    pub fn new(users: Vec<TestUser>) -> Self {
        Self { users }
    }

    pub fn find_by_username(&self, username: &str) -> Option<&TestUser> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn find_by_subject(&self, subject_id: &str) -> Option<&TestUser> {
        self.users.iter().find(|u| u.subject_id == subject_id)
    }

    /// Returns the user if the username exists and the password matches
    pub fn validate_credentials(&self, username: &str, password: &str) -> Option<&TestUser> {
        let user = self.find_by_username(username)?;
        let matches: bool = user.password.as_bytes().ct_eq(password.as_bytes()).into();
        matches.then_some(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;

    #[test]
    fn test_validate_credentials() {
        let store = UserStore::new(seed::users());
        assert_eq!(
            store.validate_credentials("Claire", "password").map(|u| u.subject_id.as_str()),
            Some("88421113")
        );
        assert!(store.validate_credentials("Claire", "wrong").is_none());
        assert!(store.validate_credentials("claire", "password").is_none());
        assert!(store.validate_credentials("Nobody", "password").is_none());
    }

    #[test]
    fn test_find_by_subject() {
        let store = UserStore::new(seed::users());
        let frank = store.find_by_subject("818727").unwrap();
        assert_eq!(frank.claim_values("country"), vec!["nl"]);
    }
}
