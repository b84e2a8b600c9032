//! IDL model and the [`SchemaRegistry`] that decodes account and event bytes.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    Cursor, IdlType, account_discriminator, decode_defined, encode, event_discriminator,
    instruction_discriminator,
};
use crate::error::Error;
use crate::path;
use crate::types::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Idl {
    #[serde(default)]
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub instructions: Vec<IdlInstruction>,
    #[serde(default)]
    pub accounts: Vec<IdlTypeDef>,
    #[serde(default)]
    pub events: Vec<IdlTypeDef>,
    #[serde(default)]
    pub types: Vec<IdlTypeDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdlInstruction {
    pub name: String,
    #[serde(default)]
    pub args: Vec<IdlField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdlTypeDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlTypeDefTy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IdlTypeDefTy {
    Struct { fields: Vec<IdlField> },
    Enum { variants: Vec<IdlEnumVariant> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdlEnumVariant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<IdlField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdlField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlType,
}

impl IdlField {
    pub fn new(name: &str, ty: IdlType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

impl Idl {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let idl: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid IDL: {e}")))?;
        idl.validate()?;
        Ok(idl)
    }

    /// Append an account definition, replacing any existing one with the same name.
    pub fn with_account(mut self, def: IdlTypeDef) -> Self {
        self.accounts.retain(|a| a.name != def.name);
        self.accounts.push(def);
        self
    }

    /// Resolve a `defined` name: custom types first, then accounts and events.
    pub fn type_def(&self, name: &str) -> Option<&IdlTypeDef> {
        self.types
            .iter()
            .chain(&self.accounts)
            .chain(&self.events)
            .find(|t| t.name == name)
    }

    pub fn account(&self, name: &str) -> Option<&IdlTypeDef> {
        self.accounts.iter().find(|t| t.name == name)
    }

    pub fn event(&self, name: &str) -> Option<&IdlTypeDef> {
        self.events.iter().find(|t| t.name == name)
    }

    pub fn instruction(&self, name: &str) -> Option<&IdlInstruction> {
        self.instructions.iter().find(|i| i.name == name)
    }

    /// Every `defined` reference must resolve inside this IDL.
    pub fn validate(&self) -> Result<(), Error> {
        let defs = self.types.iter().chain(&self.accounts).chain(&self.events);
        for def in defs {
            let fields: Vec<&IdlField> = match &def.ty {
                IdlTypeDefTy::Struct { fields } => fields.iter().collect(),
                IdlTypeDefTy::Enum { variants } => {
                    if variants.len() > 256 {
                        return Err(Error::config(format!(
                            "{}: enum {} has more than 256 variants",
                            self.name, def.name
                        )));
                    }
                    variants.iter().flat_map(|v| &v.fields).collect()
                }
            };
            for field in fields {
                self.check_type(&field.ty, &def.name)?;
            }
        }
        for ix in &self.instructions {
            for arg in &ix.args {
                self.check_type(&arg.ty, &ix.name)?;
            }
        }
        Ok(())
    }

    fn check_type(&self, ty: &IdlType, owner: &str) -> Result<(), Error> {
        match ty {
            IdlType::Defined(name) if self.type_def(name).is_none() => Err(Error::config(
                format!("{}: {owner} references unknown type {name}", self.name),
            )),
            IdlType::Vec(inner) | IdlType::Option(inner) | IdlType::Array(inner, _) => {
                self.check_type(inner, owner)
            }
            _ => Ok(()),
        }
    }
}

/// Schemas for every namespace and program, loaded once and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    idls: HashMap<String, Arc<Idl>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, namespace: &str, idl: Idl) -> Result<(), Error> {
        idl.validate()?;
        if let Some(existing) = self.idls.get(namespace)
            && **existing != idl
        {
            return Err(Error::config(format!(
                "namespace {namespace} registered twice with different schemas"
            )));
        }
        self.idls.insert(namespace.to_string(), Arc::new(idl));
        Ok(())
    }

    pub fn idl(&self, namespace: &str) -> Result<&Idl, Error> {
        self.idls
            .get(namespace)
            .map(AsRef::as_ref)
            .ok_or_else(|| Error::config(format!("no schema registered for {namespace}")))
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.idls.keys().map(String::as_str)
    }

    /// Decode an account. Types listed under `accounts` must carry their 8-byte
    /// discriminator; plain `types` are decoded from the first byte.
    pub fn decode_account(
        &self,
        namespace: &str,
        type_name: &str,
        data: &[u8],
    ) -> Result<Record, Error> {
        let idl = self.idl(namespace)?;
        let mut cursor = Cursor::new(data);
        let def = if let Some(def) = idl.account(type_name) {
            let expected = account_discriminator(type_name);
            let found = cursor.take_array::<8>()?;
            if found != expected {
                return Err(Error::codec(format!(
                    "{namespace}.{type_name}: account discriminator mismatch"
                )));
            }
            def
        } else {
            idl.type_def(type_name).ok_or_else(|| {
                Error::codec(format!("{namespace}: unknown account type {type_name}"))
            })?
        };
        decode_defined(&mut cursor, def, idl, 0)
    }

    /// Decode an event, or `None` when the discriminator belongs to another event.
    pub fn decode_event(
        &self,
        namespace: &str,
        event_name: &str,
        data: &[u8],
    ) -> Result<Option<Record>, Error> {
        let idl = self.idl(namespace)?;
        let def = idl
            .event(event_name)
            .ok_or_else(|| Error::codec(format!("{namespace}: unknown event {event_name}")))?;
        let mut cursor = Cursor::new(data);
        if cursor.take_array::<8>()? != event_discriminator(event_name) {
            return Ok(None);
        }
        decode_defined(&mut cursor, def, idl, 0).map(Some)
    }

    /// Discriminator followed by each IDL argument taken from `args` by name.
    pub fn encode_instruction(
        &self,
        namespace: &str,
        instruction: &str,
        args: &Record,
    ) -> Result<Vec<u8>, Error> {
        let idl = self.idl(namespace)?;
        let ix = idl.instruction(instruction).ok_or_else(|| {
            Error::codec(format!("{namespace}: unknown instruction {instruction}"))
        })?;
        let map = args
            .as_object()
            .ok_or_else(|| Error::codec(format!("{instruction}: arguments must be an object")))?;
        let mut data = instruction_discriminator(instruction).to_vec();
        for arg in &ix.args {
            let value = path::get_key(map, &arg.name).unwrap_or(&Value::Null);
            if value.is_null() && !matches!(arg.ty, IdlType::Option(_)) {
                return Err(Error::codec(format!(
                    "{instruction}: missing argument {}",
                    arg.name
                )));
            }
            let encoded = encode(value, &arg.ty, Some(idl))
                .map_err(|e| Error::codec(format!("{instruction}.{}: {e}", arg.name)))?;
            data.extend(encoded);
        }
        Ok(data)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;
    use crate::codec::encode;
    use serde_json::json;

    fn idl() -> Idl {
        Idl::from_json(
            r#"{
                "name": "demo",
                "instructions": [{"name": "set", "args": [{"name": "value", "type": "u64"}]}],
                "accounts": [{"name": "Counter", "type": {"kind": "struct", "fields": [
                    {"name": "owner", "type": "pubkey"},
                    {"name": "count", "type": "u64"},
                    {"name": "mode", "type": {"defined": "Mode"}}
                ]}}],
                "types": [{"name": "Mode", "type": {"kind": "enum", "variants": [
                    {"name": "Off"}, {"name": "On"}
                ]}}]
            }"#,
        )
        .unwrap()
    }

    fn registry() -> SchemaRegistry {
        let mut r = SchemaRegistry::new();
        r.register("Demo", idl()).unwrap();
        r
    }

    #[test]
    fn decodes_account_with_pascal_case_keys() {
        let idl = idl();
        let record = json!({
            "Owner": crate::types::SYSTEM_PROGRAM_ID.to_string(),
            "Count": 42,
            "Mode": "On"
        });
        let mut data = account_discriminator("Counter").to_vec();
        data.extend(encode(&record, &IdlType::Defined("Counter".into()), Some(&idl)).unwrap());
        let decoded = registry().decode_account("Demo", "Counter", &data).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn rejects_wrong_discriminator_and_short_data() {
        let r = registry();
        let mut data = account_discriminator("Other").to_vec();
        data.extend([0u8; 41]);
        assert!(matches!(
            r.decode_account("Demo", "Counter", &data),
            Err(Error::Codec { .. })
        ));
        let short = account_discriminator("Counter").to_vec();
        assert!(r.decode_account("Demo", "Counter", &short).is_err());
    }

    #[test]
    fn unknown_defined_type_fails_validation() {
        let broken = r#"{"name": "x", "types": [{"name": "A", "type": {"kind": "struct",
            "fields": [{"name": "b", "type": {"defined": "Missing"}}]}}]}"#;
        assert!(matches!(Idl::from_json(broken), Err(Error::Config { .. })));
    }

    #[test]
    fn encodes_instruction_args_by_normalized_name() {
        let data = registry()
            .encode_instruction("Demo", "set", &json!({"Value": 7}))
            .unwrap();
        assert_eq!(&data[..8], &instruction_discriminator("set"));
        assert_eq!(&data[8..], &7u64.to_le_bytes());
        assert!(registry().encode_instruction("Demo", "set", &json!({})).is_err());
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        let mut r = registry();
        let other = idl().with_account(IdlTypeDef {
            name: "Extra".into(),
            ty: IdlTypeDefTy::Struct { fields: vec![] },
        });
        assert!(r.register("Demo", other).is_err());
        assert!(r.register("Demo", idl()).is_ok());
    }
}
