//! Flow indices
//!
//! A flow index is the dot-delimited hierarchical address of an inference in
//! the plan tree (`1.4.1.3.2`). Ordering is element-wise numeric with shorter
//! prefixes first, which is exactly lexicographic order on the component
//! vector; the derived `Ord` provides it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::LoadError;

/// Hierarchical address within the plan tree
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowIndex(Vec<u64>);

impl FlowIndex {
    pub fn new(components: Vec<u64>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// True if `self` is a strict ancestor prefix of `other`
    pub fn is_prefix_of(&self, other: &FlowIndex) -> bool {
        other.0.len() > self.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// True for `other` strictly inside this subtree, or equal
    pub fn contains(&self, other: &FlowIndex) -> bool {
        self == other || self.is_prefix_of(other)
    }

    pub fn parent(&self) -> Option<FlowIndex> {
        if self.0.len() <= 1 {
            None
        } else {
            Some(FlowIndex(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn child(&self, component: u64) -> FlowIndex {
        let mut components = self.0.clone();
        components.push(component);
        FlowIndex(components)
    }
}

impl FromStr for FlowIndex {
    type Err = LoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components = s
            .split('.')
            .map(|part| part.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| LoadError::BadFlowIndex(s.to_string()))?;
        if components.is_empty() {
            return Err(LoadError::BadFlowIndex(s.to_string()));
        }
        Ok(FlowIndex(components))
    }
}

impl TryFrom<String> for FlowIndex {
    type Error = LoadError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FlowIndex> for String {
    fn from(f: FlowIndex) -> String {
        f.to_string()
    }
}

impl fmt::Display for FlowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}
