//! Typed parameter slots resolved to handles at graph build time.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, Result};
use crate::ids::ParamHandle;

/// Value of a named parameter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

impl ParamValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
        }
    }

    fn same_kind(&self, other: &ParamValue) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v)
    }
}

/// Declared parameter and its initial value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterDesc {
    pub name: String,
    pub default: ParamValue,
}

/// Name → handle lookup plus defaults.
#[derive(Clone, Debug, Default)]
pub struct ParameterTable {
    by_name: HashMap<String, ParamHandle>,
    defaults: Vec<ParamValue>,
    names: Vec<String>,
}

impl ParameterTable {
    pub fn build(descs: &[ParameterDesc]) -> Result<Self> {
        let mut table = Self::default();
        for desc in descs {
            if table.by_name.contains_key(&desc.name) {
                return Err(MotionError::DuplicateName {
                    kind: "parameter",
                    name: desc.name.clone(),
                });
            }
            let handle = ParamHandle(table.defaults.len() as u32);
            table.by_name.insert(desc.name.clone(), handle);
            table.defaults.push(desc.default);
            table.names.push(desc.name.clone());
        }
        Ok(table)
    }

    pub fn handle(&self, name: &str) -> Result<ParamHandle> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| MotionError::UnknownParameter {
                name: name.to_string(),
            })
    }

    pub fn name(&self, handle: ParamHandle) -> Option<&str> {
        self.names.get(handle.index()).map(String::as_str)
    }

    pub fn default_of(&self, handle: ParamHandle) -> Option<ParamValue> {
        self.defaults.get(handle.index()).copied()
    }

    pub fn len(&self) -> usize {
        self.defaults.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    /// Fresh value slots holding the declared defaults.
    pub fn values(&self) -> ParameterValues {
        ParameterValues {
            slots: self.defaults.clone(),
        }
    }
}

/// Per-animator parameter values, indexed by handle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterValues {
    slots: Vec<ParamValue>,
}

impl ParameterValues {
    #[inline]
    pub fn get(&self, handle: ParamHandle) -> Option<ParamValue> {
        self.slots.get(handle.index()).copied()
    }

    /// Store `value` by name; the kind must match the declaration.
    pub fn set(&mut self, table: &ParameterTable, name: &str, value: ParamValue) -> Result<()> {
        let handle = table.handle(name)?;
        let slot = self
            .slots
            .get_mut(handle.index())
            .ok_or_else(|| MotionError::UnknownParameter {
                name: name.to_string(),
            })?;
        if !slot.same_kind(&value) {
            return Err(MotionError::ParameterKindMismatch {
                name: name.to_string(),
                expected: slot.kind_name(),
                found: value.kind_name(),
            });
        }
        *slot = value;
        Ok(())
    }

    #[inline]
    pub fn get_bool(&self, handle: ParamHandle) -> Option<bool> {
        match self.get(handle)? {
            ParamValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn get_int(&self, handle: ParamHandle) -> Option<i32> {
        match self.get(handle)? {
            ParamValue::Int(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub fn get_float(&self, handle: ParamHandle) -> Option<f32> {
        match self.get(handle)? {
            ParamValue::Float(v) => Some(v),
            _ => None,
        }
    }
}
