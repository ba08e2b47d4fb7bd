/**
 * Collection Configuration
 *
 * Static descriptions of the collections the sync engine serves: which OT
 * type their documents use, which rule set guards them, how their paths map
 * to rights domains, and which paths are immutable. Loaded once at startup
 * and never mutated afterwards.
 */

use serde::{Deserialize, Serialize};

use crate::shared::ot::OtType;
use crate::shared::path_template::PathTemplate;

/// Rule set guarding a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    /// Project-scoped documents checked against project role rights
    ProjectData,
    /// User profiles
    Users,
    /// Project documents themselves
    Projects,
}

/// Rights domain owning the paths matched by its template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainConfig {
    pub domain: u32,
    #[serde(alias = "pathTemplate")]
    pub path_template: PathTemplate,
}

impl DomainConfig {
    pub fn new(domain: u32, path_template: PathTemplate) -> Self {
        Self { domain, path_template }
    }
}

/// One served collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub ot_type: OtType,
    /// `None` leaves the collection to trusted sessions only
    #[serde(default)]
    pub rules: Option<RuleKind>,
    #[serde(default)]
    pub domains: Vec<DomainConfig>,
    #[serde(default, alias = "immutableProps")]
    pub immutable: Vec<PathTemplate>,
    /// Project role allowed to edit project documents
    #[serde(default)]
    pub admin_role: Option<String>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, ot_type: OtType) -> Self {
        Self {
            name: name.into(),
            ot_type,
            rules: None,
            domains: Vec::new(),
            immutable: Vec::new(),
            admin_role: None,
        }
    }

    pub fn with_rules(mut self, rules: RuleKind) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_domain(mut self, domain: u32, template: PathTemplate) -> Self {
        self.domains.push(DomainConfig::new(domain, template));
        self
    }

    pub fn with_immutable(mut self, template: PathTemplate) -> Self {
        self.immutable.push(template);
        self
    }

    pub fn with_admin_role(mut self, role: impl Into<String>) -> Self {
        self.admin_role = Some(role.into());
        self
    }
}

/// Named project role and the right codes it holds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRoleConfig {
    pub name: String,
    #[serde(default)]
    pub rights: Vec<u32>,
}

impl ProjectRoleConfig {
    pub fn new(name: impl Into<String>, rights: impl IntoIterator<Item = u32>) -> Self {
        Self {
            name: name.into(),
            rights: rights.into_iter().collect(),
        }
    }
}

/// Read-model projection exposing a field whitelist of another collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub name: String,
    pub collection: String,
    pub fields: Vec<String>,
}
