//! Plan packages
//!
//! A deployable plan is a ZIP (or bare directory) holding `manifest.json`,
//! the two repo files, provision trees and an optional `path_mapping.json`
//! that rewrites logical resource paths to on-disk locations.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::concept::ConceptEntry;
use super::error::LoadError;
use super::inference::InferenceEntry;
use super::repo::{ConceptRepo, InferenceRepo};

/// Declared run input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Declared run output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub concepts: String,
    pub inferences: String,
}

/// `manifest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    pub entry: ManifestEntry,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputSpec>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputSpec>,
    #[serde(default)]
    pub default_agent: Option<String>,
}

/// A loaded, validated plan ready to back runs
#[derive(Debug)]
pub struct Plan {
    pub manifest: Manifest,
    pub concepts: ConceptRepo,
    pub inferences: InferenceRepo,
    /// Root for `provisions/**` resolution
    pub root: PathBuf,
    path_mapping: BTreeMap<String, String>,
}

impl Plan {
    /// Load a plan from an unpacked package directory
    pub fn load_dir(root: &Path) -> Result<Self, LoadError> {
        let manifest: Manifest = read_json(&root.join("manifest.json"))?;

        let concept_entries: Vec<ConceptEntry> = read_json(&root.join(&manifest.entry.concepts))?;
        let inference_entries: Vec<InferenceEntry> = read_json(&root.join(&manifest.entry.inferences))?;

        let concepts = ConceptRepo::load(concept_entries)?;
        let inferences = InferenceRepo::load(inference_entries, &concepts)?;

        // Ground concepts must carry a well-formed reference from load
        for concept in concepts.iter() {
            if concept.is_ground_concept {
                concept.initial_reference().map_err(|source| LoadError::BadReference {
                    concept: concept.id.clone(),
                    source,
                })?;
            }
        }

        let mapping_path = root.join("path_mapping.json");
        let path_mapping = if mapping_path.exists() {
            read_json(&mapping_path)?
        } else {
            BTreeMap::new()
        };

        info!(
            plan = %manifest.name, version = %manifest.version,
            concepts = concepts.len(), inferences = inferences.len(),
            "Loaded plan package"
        );

        Ok(Self {
            manifest,
            concepts,
            inferences,
            root: root.to_path_buf(),
            path_mapping,
        })
    }

    /// Unpack a ZIP archive into `dest` and load it
    pub fn load_zip(bytes: &[u8], dest: &Path) -> Result<Self, LoadError> {
        let reader = std::io::Cursor::new(bytes);
        let mut archive = zip::ZipArchive::new(reader).map_err(|e| LoadError::Archive(e.to_string()))?;
        std::fs::create_dir_all(dest)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| LoadError::Archive(e.to_string()))?;
            let Some(rel) = entry.enclosed_name() else {
                return Err(LoadError::Archive(format!("unsafe path in archive: {}", entry.name())));
            };
            let out_path = dest.join(rel);
            if entry.is_dir() {
                std::fs::create_dir_all(&out_path)?;
            } else {
                if let Some(parent) = out_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut buf = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut buf)?;
                std::fs::write(&out_path, buf)?;
            }
        }
        Self::load_dir(dest)
    }

    /// Resolve a logical provision path through `path_mapping.json`
    pub fn resolve_provision(&self, logical: &str) -> PathBuf {
        let mapped = self.path_mapping.get(logical).map(String::as_str).unwrap_or(logical);
        self.root.join(mapped)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LoadError> {
    if !path.exists() {
        return Err(LoadError::PackageEntryMissing(path.display().to_string()));
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| LoadError::PackageJson {
        file: path.display().to_string(),
        source,
    })
}
