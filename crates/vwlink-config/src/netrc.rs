// Minimal `.netrc` reader: `machine`, `default`, `login`, `password`,
// `account`. `macdef` bodies are skipped up to the next blank line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Host key looked up when a profile does not name one.
pub const DEFAULT_NETRC_HOST: &str = "volkswagen";

/// One `machine` (or `default`) entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Machine {
    pub login: Option<String>,
    pub password: Option<String>,
    /// Carries the S-PIN by convention.
    pub account: Option<String>,
}

#[derive(Debug, Default)]
pub struct Netrc {
    machines: BTreeMap<String, Machine>,
    default: Option<Machine>,
}

impl Netrc {
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut netrc = Self::default();
        // `None` key is the `default` entry.
        let mut current: Option<(Option<String>, Machine)> = None;
        let mut tokens = tokenize(text).into_iter();

        while let Some(token) = tokens.next() {
            match token {
                "machine" => {
                    netrc.finish(current.take());
                    let name = tokens.next().ok_or("'machine' without a host name")?;
                    current = Some((Some(name.to_owned()), Machine::default()));
                }
                "default" => {
                    netrc.finish(current.take());
                    current = Some((None, Machine::default()));
                }
                "login" | "password" | "account" => {
                    let value = tokens
                        .next()
                        .ok_or_else(|| format!("'{token}' without a value"))?
                        .to_owned();
                    let Some((_, machine)) = current.as_mut() else {
                        return Err(format!("'{token}' outside a machine entry"));
                    };
                    let slot = match token {
                        "login" => &mut machine.login,
                        "password" => &mut machine.password,
                        _ => &mut machine.account,
                    };
                    *slot = Some(value);
                }
                other => return Err(format!("unexpected token '{other}'")),
            }
        }
        netrc.finish(current);
        Ok(netrc)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Netrc {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).map_err(|reason| ConfigError::Netrc {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Entry for `host`, falling back to the `default` entry.
    pub fn machine(&self, host: &str) -> Option<&Machine> {
        self.machines.get(host).or(self.default.as_ref())
    }

    fn finish(&mut self, entry: Option<(Option<String>, Machine)>) {
        match entry {
            Some((Some(host), machine)) => {
                self.machines.insert(host, machine);
            }
            Some((None, machine)) => self.default = Some(machine),
            None => {}
        }
    }
}

fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut in_macdef = false;
    for line in text.lines() {
        if in_macdef {
            in_macdef = !line.trim().is_empty();
            continue;
        }
        let mut words = line.split_whitespace();
        while let Some(word) = words.next() {
            if word.starts_with('#') {
                break;
            }
            if word == "macdef" {
                words.next();
                in_macdef = true;
                break;
            }
            tokens.push(word);
        }
    }
    tokens
}

/// `~/.netrc`, when a home directory is known.
pub fn default_netrc_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".netrc"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_machines_across_lines() {
        let netrc = Netrc::parse(
            "# account data\n\
             machine volkswagen\n  login driver@example.com\n  password hunter2\n  account 1234\n\
             machine other login a password b\n",
        )
        .unwrap();

        assert_eq!(
            netrc.machine("volkswagen"),
            Some(&Machine {
                login: Some("driver@example.com".into()),
                password: Some("hunter2".into()),
                account: Some("1234".into()),
            })
        );
        assert_eq!(
            netrc.machine("other").unwrap().password.as_deref(),
            Some("b")
        );
        assert!(netrc.machine("missing").is_none());
    }

    #[test]
    fn default_entry_is_the_fallback() {
        let netrc = Netrc::parse("default login anyone password secret").unwrap();
        assert_eq!(
            netrc.machine("volkswagen").unwrap().login.as_deref(),
            Some("anyone")
        );
    }

    #[test]
    fn macdef_bodies_are_skipped() {
        let netrc = Netrc::parse(
            "macdef init\ncd /pub\nmachine fake login x\n\nmachine volkswagen login real\n",
        )
        .unwrap();
        assert!(netrc.machine("fake").is_none());
        assert_eq!(
            netrc.machine("volkswagen").unwrap().login.as_deref(),
            Some("real")
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Netrc::parse("login orphan").is_err());
        assert!(Netrc::parse("machine volkswagen password").is_err());
        assert!(Netrc::parse("machine volkswagen port 22").is_err());
    }
}
