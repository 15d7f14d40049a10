// YAML schema declaration. Deployments describe their attribute types in a
// config file; the built-in matching rules are referenced by name or OID.
// The result is an immutable SchemaRegistry built once at startup.

use crate::schema::{AttributeType, Schema, SchemaRegistry, SYNTAX_DIRECTORY_STRING};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub attribute_types: Vec<AttributeTypeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeTypeConfig {
    pub oid: String,
    pub names: Vec<String>,
    /// Supertype name; must be declared earlier in the list.
    pub sup: Option<String>,
    /// Syntax OID (defaults to Directory String).
    pub syntax: Option<String>,
    pub equality: Option<String>,
    pub ordering: Option<String>,
    pub substr: Option<String>,
    pub approx: Option<String>,
}

impl SchemaConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self> {
        let config: SchemaConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Resolve the declaration into a registry. Rule references resolve
    /// against the built-in rules; sup references resolve against attribute
    /// types declared earlier (declare-before-use).
    pub fn build(&self) -> Result<SchemaRegistry> {
        let mut reg = SchemaRegistry::new();
        for at_cfg in &self.attribute_types {
            if at_cfg.names.is_empty() {
                bail!("attribute type {} declares no names", at_cfg.oid);
            }
            let syntax = at_cfg
                .syntax
                .clone()
                .unwrap_or_else(|| SYNTAX_DIRECTORY_STRING.to_string());
            let names: Vec<&str> = at_cfg.names.iter().map(|s| s.as_str()).collect();
            let mut at = AttributeType::new(&at_cfg.oid, &names, &syntax);

            if let Some(id) = &at_cfg.equality {
                let rule = reg.matching_rule(id).with_context(|| {
                    format!("unknown equality rule {:?} on {}", id, at_cfg.oid)
                })?;
                at = at.with_equality(rule);
            }
            if let Some(id) = &at_cfg.ordering {
                let rule = reg.matching_rule(id).with_context(|| {
                    format!("unknown ordering rule {:?} on {}", id, at_cfg.oid)
                })?;
                at = at.with_ordering(rule);
            }
            if let Some(id) = &at_cfg.substr {
                let rule = reg.matching_rule(id).with_context(|| {
                    format!("unknown substr rule {:?} on {}", id, at_cfg.oid)
                })?;
                at = at.with_substr(rule);
            }
            if let Some(id) = &at_cfg.approx {
                let rule = reg.matching_rule(id).with_context(|| {
                    format!("unknown approx rule {:?} on {}", id, at_cfg.oid)
                })?;
                at = at.with_approx(rule);
            }

            if let Some(sup_name) = &at_cfg.sup {
                let sup = reg.attribute_type(sup_name).with_context(|| {
                    format!(
                        "supertype {:?} of {} is not declared earlier",
                        sup_name, at_cfg.oid
                    )
                })?;
                at = at.with_sup(sup);
            }

            reg.add_attribute_type(at);
        }
        Ok(reg)
    }
}
