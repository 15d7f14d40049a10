// Directory entry model as seen by the filter engine: a DN plus an ordered
// attribute list, each attribute a resolved description with its values.

use crate::schema::AttributeType;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Attribute {
    pub desc: Arc<AttributeType>,
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    pub fn new(desc: Arc<AttributeType>, values: Vec<Vec<u8>>) -> Self {
        Self { desc, values }
    }

    pub fn from_strs(desc: Arc<AttributeType>, values: &[&str]) -> Self {
        Self {
            desc,
            values: values.iter().map(|v| v.as_bytes().to_vec()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub dn: String,
    pub attributes: Vec<Attribute>,
}

impl Entry {
    pub fn new(dn: &str) -> Self {
        Self {
            dn: dn.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attr(mut self, desc: Arc<AttributeType>, values: &[&str]) -> Self {
        self.attributes.push(Attribute::from_strs(desc, values));
        self
    }

    /// Attribute instances whose description is the target type or a
    /// subtype of it, in entry order.
    pub fn attributes_matching<'a>(
        &'a self,
        target: &'a AttributeType,
    ) -> impl Iterator<Item = &'a Attribute> {
        self.attributes
            .iter()
            .filter(move |a| a.desc.is_subtype_of(target))
    }
}
