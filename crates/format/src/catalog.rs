use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::case::{CaseIdx, TestCase};

/// An ordered collection of test cases. The order of the cases is the order in which verdicts are
/// reported, regardless of the order in which they complete.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub cases: Vec<TestCase>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read the catalog at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("the catalog is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("the catalog contains no cases")]
    Empty,

    #[error("case #{index} ({method}) is invalid: {reason}")]
    PolicyViolation {
        index: usize,
        method: String,
        reason: String,
    },
}

#[derive(Deserialize)]
struct RawCatalog {
    #[serde(default)]
    name: Option<String>,
    cases: Vec<Value>,
}

impl Catalog {
    /// Reads and validates the catalog at the given path.
    pub fn try_from_path(path: &Path) -> Result<Self, CatalogError> {
        let file = File::open(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw = serde_json::from_reader::<_, RawCatalog>(BufReader::new(file))
            .map_err(CatalogError::Malformed)?;
        let catalog = Self::from_raw(raw)?;
        info!(
            path = %path.display(),
            name = catalog.name.as_deref().unwrap_or("unnamed"),
            cases = catalog.cases.len(),
            "Loaded the test catalog"
        );
        Ok(catalog)
    }

    pub fn from_json_str(json: &str) -> Result<Self, CatalogError> {
        let raw = serde_json::from_str::<RawCatalog>(json).map_err(CatalogError::Malformed)?;
        Self::from_raw(raw)
    }

    /// Builds a catalog out of already constructed cases, validating each of them.
    pub fn from_cases(cases: Vec<TestCase>) -> Result<Self, CatalogError> {
        let catalog = Self { name: None, cases };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Checks every case in the catalog. Any violation is fatal: a catalog is either fully valid or
    /// it's not run at all.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (index, case) in self.cases.iter().enumerate() {
            let violation = |reason: String| CatalogError::PolicyViolation {
                index,
                method: case.method.clone(),
                reason,
            };
            if case.method.trim().is_empty() {
                return Err(violation("the method name is empty".to_string()));
            }
            if case.timeout_ms == Some(0) {
                return Err(violation("the timeout override must be positive".to_string()));
            }
            case.policy.validate().map_err(violation)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (CaseIdx, &TestCase)> {
        self.cases
            .iter()
            .enumerate()
            .map(|(idx, case)| (CaseIdx::new(idx), case))
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    fn from_raw(raw: RawCatalog) -> Result<Self, CatalogError> {
        let cases = raw
            .cases
            .into_iter()
            .enumerate()
            .map(|(index, value)| {
                let method = value
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or("<unknown>")
                    .to_string();
                serde_json::from_value::<TestCase>(value).map_err(|error| {
                    CatalogError::PolicyViolation {
                        index,
                        method,
                        reason: error.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let catalog = Self {
            name: raw.name,
            cases,
        };
        catalog.validate()?;
        debug!(cases = catalog.len(), "Validated the test catalog");
        Ok(catalog)
    }
}
