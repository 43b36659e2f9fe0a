//! Receiver module capability table
//!
//! Which configuration interface a module generation speaks decides how the
//! driver switches protocol output on and off.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Optional module features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Key/value configuration (CFG-VALSET / CFG-VALGET)
    CfgValXxx,
}

/// Supported receiver generations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    /// u-blox M8 (CFG-PRT configuration)
    #[default]
    M8,
    /// u-blox M9
    M9,
    /// u-blox M10
    M10,
}

impl ModuleType {
    /// Features of this generation
    pub fn capabilities(&self) -> CapabilitySet {
        CapabilityRegistry::for_module(*self)
    }

    /// Whether the module has `feature`
    pub fn has(&self, feature: Feature) -> bool {
        self.capabilities().supports(feature)
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleType::M8 => write!(f, "M8"),
            ModuleType::M9 => write!(f, "M9"),
            ModuleType::M10 => write!(f, "M10"),
        }
    }
}

/// Module feature set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    features: HashSet<Feature>,
    description: String,
}

impl CapabilitySet {
    /// Create capability set with description
    pub fn with_description(description: &str) -> Self {
        Self {
            features: HashSet::new(),
            description: description.to_string(),
        }
    }

    /// Add multiple features
    pub fn add_all(&mut self, features: &[Feature]) -> &mut Self {
        self.features.extend(features.iter().copied());
        self
    }

    /// Check if a feature is supported
    pub fn supports(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    /// Get description
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Capability registry for all module generations
pub struct CapabilityRegistry;

impl CapabilityRegistry {
    /// Features of a module generation
    pub fn for_module(module: ModuleType) -> CapabilitySet {
        match module {
            ModuleType::M8 => CapabilitySet::with_description("u-blox M8, CFG-PRT configuration"),
            ModuleType::M9 => {
                let mut caps = CapabilitySet::with_description("u-blox M9, key/value configuration");
                caps.add_all(&[Feature::CfgValXxx]);
                caps
            }
            ModuleType::M10 => {
                let mut caps = CapabilitySet::with_description("u-blox M10, key/value configuration");
                caps.add_all(&[Feature::CfgValXxx]);
                caps
            }
        }
    }
}
