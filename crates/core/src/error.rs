use std::time::Duration;

use rpc_dt_common::types::NodeRole;
use rpc_dt_format::catalog::CatalogError;

pub const READINESS_TIMEOUT_EXIT_CODE: i32 = 2;
pub const POLICY_VIOLATION_EXIT_CODE: i32 = 3;
pub const FATAL_EXIT_CODE: i32 = 4;

/// The errors which abort a run. Anything that goes wrong with a single case is part of its
/// verdict instead.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("the {role} node did not become ready within {timeout:?}")]
    ReadinessTimeout { role: NodeRole, timeout: Duration },

    #[error("the {role} node is not ready, refusing to compare against it")]
    NodeNotReady { role: NodeRole },

    #[error("invalid test catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HarnessError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ReadinessTimeout { .. } | Self::NodeNotReady { .. } => {
                READINESS_TIMEOUT_EXIT_CODE
            }
            Self::Catalog(CatalogError::Io { .. }) => FATAL_EXIT_CODE,
            Self::Catalog(_) => POLICY_VIOLATION_EXIT_CODE,
            Self::Other(_) => FATAL_EXIT_CODE,
        }
    }
}
