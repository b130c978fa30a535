//! Deployment timeline for `ots`.
//!
//! An append-only log of deployment actions plus the CURRENT and ROLLBACK
//! image aliases derived from it. Rollback picks its target from the log,
//! not from the ROLLBACK alias, so redeploying the same tag never makes it
//! the rollback target of itself.

pub mod storage;

pub use storage::{
    ALIAS_CURRENT, ALIAS_ROLLBACK, Deployment, DeploymentAction, ImageAlias, ImageRef,
    NewDeployment, ParseActionError, PreviousTag, ServiceAction, ServiceInstance,
    ServiceInstanceParams, TimelineDb,
};
pub use ots_core::DatabaseError;
