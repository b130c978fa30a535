//! Database models for the deployment timeline.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::db::DatabaseError;

/// Alias that commands launch by default.
pub const ALIAS_CURRENT: &str = "CURRENT";

/// Alias holding the image CURRENT pointed at before the last switch.
pub const ALIAS_ROLLBACK: &str = "ROLLBACK";

/// Deployment record from the timeline. Never updated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Deployment {
    pub id: i64,
    pub timestamp: String,
    pub port: Option<i64>,
    pub image: String,
    pub tag: String,
    pub action: String,
    pub success: bool,
    pub notes: Option<String>,
}

impl Deployment {
    /// Parse the stored action text.
    pub fn action(&self) -> Result<DeploymentAction, DatabaseError> {
        self.action.parse().map_err(|e: ParseActionError| {
            DatabaseError::InvalidRecord(format!("deployment {}: {e}", self.id))
        })
    }

    /// The artifact this record refers to.
    pub fn image_ref(&self) -> ImageRef {
        ImageRef::new(&self.image, &self.tag)
    }
}

/// Image alias record (CURRENT, ROLLBACK, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImageAlias {
    pub alias: String,
    pub image: String,
    pub tag: String,
    pub set_at: String,
}

impl From<ImageAlias> for ImageRef {
    fn from(alias: ImageAlias) -> Self {
        Self {
            image: alias.image,
            tag: alias.tag,
        }
    }
}

/// An `(image, tag)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImageRef {
    pub image: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
        }
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.image, self.tag)
    }
}

/// A distinct `(image, tag)` pair from history with the time it was last live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PreviousTag {
    pub image: String,
    pub tag: String,
    pub last_used: String,
}

impl PreviousTag {
    pub fn image_ref(&self) -> ImageRef {
        ImageRef::new(&self.image, &self.tag)
    }
}

/// Service instance record from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceInstance {
    pub id: i64,
    pub package: String,
    pub instance: String,
    pub config_file: String,
    pub data_dir: String,
    pub port: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub notes: Option<String>,
}

/// Service action audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServiceAction {
    pub id: i64,
    pub timestamp: String,
    pub package: String,
    pub instance: String,
    pub action: String,
    pub success: bool,
    pub notes: Option<String>,
}

/// Deployment action kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeploymentAction {
    Deploy,
    Redeploy,
    Undeploy,
    Rollback,
    SetCurrent,
}

impl DeploymentAction {
    /// Actions that put an image live. Rollbacks are left out so they never
    /// count as a new data point when ranking history.
    pub const LIVE: [Self; 3] = [Self::Deploy, Self::Redeploy, Self::SetCurrent];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Deploy => "deploy",
            Self::Redeploy => "redeploy",
            Self::Undeploy => "undeploy",
            Self::Rollback => "rollback",
            Self::SetCurrent => "set-current",
        }
    }
}

impl std::fmt::Display for DeploymentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unknown deployment action text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown deployment action '{0}' (expected deploy, redeploy, undeploy, rollback or set-current)")]
pub struct ParseActionError(pub String);

impl FromStr for DeploymentAction {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deploy" => Ok(Self::Deploy),
            "redeploy" => Ok(Self::Redeploy),
            "undeploy" => Ok(Self::Undeploy),
            "rollback" => Ok(Self::Rollback),
            "set-current" | "set_current" => Ok(Self::SetCurrent),
            _ => Err(ParseActionError(s.to_string())),
        }
    }
}
