//! Third-party integrations known to the portal.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A connected third-party service.
///
/// The lowercase name (`quickbooks`, `gmail`) is used in URLs, storage keys and logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Integration {
    /// QuickBooks Online: invoices, customers, payments
    QuickBooks,
    /// Gmail: customer inquiries from the contact form
    Gmail,
}

impl Integration {
    pub const ALL: [Integration; 2] = [Integration::QuickBooks, Integration::Gmail];

    /// Stable identifier used for routes and storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Integration::QuickBooks => "quickbooks",
            Integration::Gmail => "gmail",
        }
    }

    /// Scope requested when the admin has not saved one.
    pub fn default_scope(&self) -> &'static str {
        match self {
            Integration::QuickBooks => "com.intuit.quickbooks.accounting",
            Integration::Gmail => "https://www.googleapis.com/auth/gmail.modify",
        }
    }

    /// Whether API calls need a provider account identifier (QuickBooks realm ID).
    pub fn requires_account_id(&self) -> bool {
        matches!(self, Integration::QuickBooks)
    }
}

impl fmt::Display for Integration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Integration::QuickBooks => write!(f, "QuickBooks"),
            Integration::Gmail => write!(f, "Gmail"),
        }
    }
}

impl FromStr for Integration {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "quickbooks" | "qb" => Ok(Integration::QuickBooks),
            "gmail" => Ok(Integration::Gmail),
            other => Err(anyhow!("Unknown integration '{}'", other)),
        }
    }
}

/// Provider environment. Only QuickBooks distinguishes sandbox from production.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sandbox" | "" => Ok(Environment::Sandbox),
            "production" => Ok(Environment::Production),
            other => Err(anyhow!("Unknown environment '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integration_names() {
        assert_eq!("quickbooks".parse::<Integration>().unwrap(), Integration::QuickBooks);
        assert_eq!("QuickBooks".parse::<Integration>().unwrap(), Integration::QuickBooks);
        assert_eq!("gmail".parse::<Integration>().unwrap(), Integration::Gmail);
        assert!("github".parse::<Integration>().is_err());
        assert!("".parse::<Integration>().is_err());
    }

    #[test]
    fn test_integration_serde_names_match_routes() {
        for integration in Integration::ALL {
            let json = serde_json::to_string(&integration).unwrap();
            assert_eq!(json, format!("\"{}\"", integration.as_str()));
        }
    }

    #[test]
    fn test_environment_defaults_to_sandbox() {
        assert_eq!(Environment::default(), Environment::Sandbox);
        assert_eq!("".parse::<Environment>().unwrap(), Environment::Sandbox);
        assert_eq!("Production".parse::<Environment>().unwrap(), Environment::Production);
        assert!("staging".parse::<Environment>().is_err());
    }
}
