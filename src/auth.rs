use std::fmt;

use crate::model::{Coach, Player};

// Credentials are shared secrets compared as plain strings. Real authentication belongs in
// front of the store, not here.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    UnknownCoach,
    BadPassword,
    UnknownPlayer,
}

impl fmt::Display for LoginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginError::UnknownCoach => write!(f, "no coach matches that login"),
            LoginError::BadPassword => write!(f, "invalid coach password"),
            LoginError::UnknownPlayer => write!(f, "invalid player name or access code"),
        }
    }
}

impl std::error::Error for LoginError {}

/// Finds a coach by id, email or name and checks the password.
pub fn login_coach<'a>(
    coaches: &'a [Coach],
    identifier: &str,
    password: &str,
) -> Result<&'a Coach, LoginError> {
    let identifier = identifier.trim();
    let coach = coaches
        .iter()
        .find(|c| {
            c.id == identifier
                || (!c.email.is_empty() && c.email.eq_ignore_ascii_case(identifier))
                || c.name.eq_ignore_ascii_case(identifier)
        })
        .ok_or(LoginError::UnknownCoach)?;
    if coach.password.as_deref() == Some(password) {
        Ok(coach)
    } else {
        Err(LoginError::BadPassword)
    }
}

/// Parent login: player name (any case) or id, plus the player's access code.
pub fn login_parent<'a>(
    players: &'a [Player],
    name_or_id: &str,
    access_code: &str,
) -> Result<&'a Player, LoginError> {
    let needle = name_or_id.trim();
    players
        .iter()
        .find(|p| {
            (p.name.eq_ignore_ascii_case(needle) || p.id == needle)
                && p.access_code == access_code.trim()
        })
        .ok_or(LoginError::UnknownPlayer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::{fallback_coaches, fallback_players};

    #[test]
    fn coach_login_by_email_or_name() {
        let coaches = fallback_coaches();
        assert!(login_coach(&coaches, "ADMIN@example.com", "admin").is_ok());
        assert!(login_coach(&coaches, "head coach", "admin").is_ok());
        assert_eq!(
            login_coach(&coaches, "coach_admin", "nope"),
            Err(LoginError::BadPassword)
        );
        assert_eq!(
            login_coach(&coaches, "ghost", "admin"),
            Err(LoginError::UnknownCoach)
        );
    }

    #[test]
    fn parent_login_is_case_insensitive_on_name() {
        let players = fallback_players();
        let p = login_parent(&players, "luke skehill", "1234").unwrap();
        assert_eq!(p.id, "p1");
        assert!(login_parent(&players, "p1", "0000").is_err());
    }
}
