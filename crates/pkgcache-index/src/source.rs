//! Upstream package enumerators feeding [`crate::PackageCache::refresh`].

use crate::package::Package;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read package export: {0}")]
    Read(std::io::Error),
    #[error("failed to parse package export: {0}")]
    Json(serde_json::Error),
    #[error("unexpected package export layout: {0}")]
    Shape(String),
}

/// Produces the complete, current package set. Implementations may be slow.
pub trait PackageSource {
    fn packages(&mut self) -> Result<Vec<Package>, SourceError>;
}

impl PackageSource for Vec<Package> {
    fn packages(&mut self) -> Result<Vec<Package>, SourceError> {
        Ok(self.clone())
    }
}

/// Reads a JSON export written by the upstream enumerator.
///
/// Two layouts are accepted: an array of package objects, or an object keyed
/// by package id whose values hold the remaining fields.
#[derive(Debug, Clone)]
pub struct JsonSource {
    path: PathBuf,
}

impl JsonSource {
    pub fn new(path: impl Into<PathBuf>) -> JsonSource {
        JsonSource { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PackageSource for JsonSource {
    fn packages(&mut self) -> Result<Vec<Package>, SourceError> {
        let content = std::fs::read_to_string(&self.path).map_err(SourceError::Read)?;
        parse_packages(&content)
    }
}

pub fn parse_packages(content: &str) -> Result<Vec<Package>, SourceError> {
    let value: serde_json::Value = serde_json::from_str(content).map_err(SourceError::Json)?;
    match value {
        serde_json::Value::Array(entries) => entries
            .into_iter()
            .map(|entry| serde_json::from_value(entry).map_err(SourceError::Json))
            .collect(),
        serde_json::Value::Object(map) => {
            let mut packages = Vec::with_capacity(map.len());
            for (id, entry) in map {
                let serde_json::Value::Object(mut fields) = entry else {
                    return Err(SourceError::Shape(format!(
                        "entry {id} is not an object"
                    )));
                };
                fields.insert("id".to_string(), serde_json::Value::String(id.clone()));
                fields
                    .entry("name")
                    .or_insert_with(|| serde_json::Value::String(id.clone()));
                let pkg = serde_json::from_value(serde_json::Value::Object(fields))
                    .map_err(SourceError::Json)?;
                packages.push(pkg);
            }
            Ok(packages)
        }
        _ => Err(SourceError::Shape(
            "expected an array or an object of packages".to_string(),
        )),
    }
}
