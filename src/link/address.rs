use std::fmt;

use crate::error::{Error, Result};

pub const DEFAULT_USER: &str = "robot";
pub const DEFAULT_PASSWORD: &str = "maker";
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Address typed by the operator: `[user[:password]@]host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotAddress {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

impl RobotAddress {
    /// Credentials default to `robot`/`maker` only when no `@` is present;
    /// `user@host` means an empty password.
    pub fn parse(address: &str) -> Result<Self> {
        let address = address.trim();
        let (user, password, rest) = match address.split_once('@') {
            Some((credentials, rest)) => match credentials.split_once(':') {
                Some((user, password)) => (user.to_string(), password.to_string(), rest),
                None => (credentials.to_string(), String::new(), rest),
            },
            None => (DEFAULT_USER.to_string(), DEFAULT_PASSWORD.to_string(), address),
        };
        let (host, port) = match rest.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::InvalidAddress(format!("bad port '{}'", port)))?;
                (host.to_string(), port)
            }
            None => (rest.to_string(), DEFAULT_SSH_PORT),
        };
        if host.is_empty() {
            return Err(Error::InvalidAddress(format!("no host in '{}'", address)));
        }
        Ok(RobotAddress { user, password, host, port })
    }
}

impl fmt::Display for RobotAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let a = RobotAddress::parse("10.0.0.2").unwrap();
        assert_eq!(a.user, "robot");
        assert_eq!(a.password, "maker");
        assert_eq!(a.host, "10.0.0.2");
        assert_eq!(a.port, 22);
    }

    #[test]
    fn test_full_address() {
        let a = RobotAddress::parse("pi:secret@ev3dev.local:2222").unwrap();
        assert_eq!(a.user, "pi");
        assert_eq!(a.password, "secret");
        assert_eq!(a.host, "ev3dev.local");
        assert_eq!(a.port, 2222);
        assert_eq!(a.to_string(), "pi@ev3dev.local:2222");
    }

    #[test]
    fn test_user_without_password() {
        let a = RobotAddress::parse("pi@robot").unwrap();
        assert_eq!(a.user, "pi");
        assert_eq!(a.password, "");
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(RobotAddress::parse("robot:abc"), Err(Error::InvalidAddress(_))));
        let err = RobotAddress::parse("pi@").unwrap_err();
        assert_eq!(err.to_string(), "Invalid robot address: no host in 'pi@'");
    }
}
