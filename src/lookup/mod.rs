//! Declarative account lookups.
//!
//! A [`Lookup`] tree describes how to find one or more accounts: a literal address, a
//! value taken from the report, a program-derived address, or entries of an address
//! lookup table. Trees may share subtrees; [`Lookup::fingerprint`] identifies equal
//! subtrees structurally so they resolve once per call.

pub mod resolver;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::codec::IdlType;
use crate::error::Error;
use crate::types::{Address, base58};

pub use resolver::LookupResolver;

pub type Fingerprint = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Lookup {
    Constant {
        name: String,
        #[serde(with = "base58")]
        address: Address,
        #[serde(default)]
        is_signer: bool,
        #[serde(default)]
        is_writable: bool,
    },
    Derived {
        name: String,
        program: Box<Lookup>,
        #[serde(default)]
        seeds: Vec<Seed>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        internal_field: Option<InternalField>,
        #[serde(default)]
        is_signer: bool,
        #[serde(default)]
        is_writable: bool,
        #[serde(default)]
        optional: bool,
    },
    Field {
        name: String,
        path: String,
        #[serde(default = "default_field_type")]
        value_type: IdlType,
        #[serde(default)]
        is_signer: MetaFlag,
        #[serde(default)]
        is_writable: MetaFlag,
        #[serde(default)]
        optional: bool,
    },
    TableSlice {
        table_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        indexes: Option<Vec<usize>>,
        #[serde(default)]
        is_signer: bool,
        #[serde(default)]
        is_writable: bool,
        #[serde(default)]
        optional: bool,
    },
    DerivedTable {
        name: String,
        accounts: Box<Lookup>,
        #[serde(default)]
        optional: bool,
    },
}

fn default_field_type() -> IdlType {
    IdlType::Pubkey
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seed {
    Static(#[serde(with = "crate::types::hex_bytes")] Vec<u8>),
    Dynamic(Lookup),
}

impl Seed {
    pub fn literal(bytes: &[u8]) -> Self {
        Self::Static(bytes.to_vec())
    }

    pub fn field(path: &str, value_type: IdlType) -> Self {
        Self::Dynamic(Lookup::Field {
            name: path.to_string(),
            path: path.to_string(),
            value_type,
            is_signer: MetaFlag::default(),
            is_writable: MetaFlag::default(),
            optional: false,
        })
    }
}

/// One level of on-chain indirection: decode the derived account as `type_name` and use
/// the address(es) found at `location`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalField {
    pub type_name: String,
    pub location: String,
}

/// A signer/writable flag, either fixed or read per account from a `u64` bitmap in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaFlag {
    Value(bool),
    Bitmap { bitmap_path: String },
}

impl Default for MetaFlag {
    fn default() -> Self {
        Self::Value(false)
    }
}

impl From<bool> for MetaFlag {
    fn from(value: bool) -> Self {
        Self::Value(value)
    }
}

impl Lookup {
    pub fn constant(name: &str, address: Address, is_signer: bool, is_writable: bool) -> Self {
        Self::Constant {
            name: name.to_string(),
            address,
            is_signer,
            is_writable,
        }
    }

    pub fn derived(name: &str, program: Lookup, seeds: Vec<Seed>) -> Self {
        Self::Derived {
            name: name.to_string(),
            program: Box::new(program),
            seeds,
            internal_field: None,
            is_signer: false,
            is_writable: false,
            optional: false,
        }
    }

    pub fn field(name: &str, path: &str) -> Self {
        Self::Field {
            name: name.to_string(),
            path: path.to_string(),
            value_type: IdlType::Pubkey,
            is_signer: MetaFlag::default(),
            is_writable: MetaFlag::default(),
            optional: false,
        }
    }

    pub fn table_slice(table_name: &str, indexes: Option<Vec<usize>>) -> Self {
        Self::TableSlice {
            table_name: table_name.to_string(),
            indexes,
            is_signer: false,
            is_writable: false,
            optional: false,
        }
    }

    pub fn derived_table(name: &str, accounts: Lookup) -> Self {
        Self::DerivedTable {
            name: name.to_string(),
            accounts: Box::new(accounts),
            optional: false,
        }
    }

    #[must_use]
    pub fn writable(mut self) -> Self {
        match &mut self {
            Self::Constant { is_writable, .. }
            | Self::Derived { is_writable, .. }
            | Self::TableSlice { is_writable, .. } => *is_writable = true,
            Self::Field { is_writable, .. } => *is_writable = MetaFlag::Value(true),
            Self::DerivedTable { .. } => {}
        }
        self
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        match &mut self {
            Self::Derived { optional, .. }
            | Self::Field { optional, .. }
            | Self::TableSlice { optional, .. }
            | Self::DerivedTable { optional, .. } => *optional = true,
            Self::Constant { .. } => {}
        }
        self
    }

    #[must_use]
    pub fn with_internal_field(mut self, type_name: &str, location: &str) -> Self {
        if let Self::Derived { internal_field, .. } = &mut self {
            *internal_field = Some(InternalField {
                type_name: type_name.to_string(),
                location: location.to_string(),
            });
        }
        self
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Constant { name, .. }
            | Self::Derived { name, .. }
            | Self::Field { name, .. }
            | Self::DerivedTable { name, .. } => name,
            Self::TableSlice { table_name, .. } => table_name,
        }
    }

    pub fn is_optional(&self) -> bool {
        match self {
            Self::Constant { .. } => false,
            Self::Derived { optional, .. }
            | Self::Field { optional, .. }
            | Self::TableSlice { optional, .. }
            | Self::DerivedTable { optional, .. } => *optional,
        }
    }

    /// SHA-256 over the canonical JSON form. Field order is fixed by the type, so equal
    /// trees always hash equal regardless of where they were built.
    pub fn fingerprint(&self) -> Result<Fingerprint, Error> {
        let canonical = serde_json::to_vec(self)?;
        let digest = Sha256::digest(&canonical);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Ok(out)
    }

    /// Pure lookups depend on neither the report nor on-chain state and may be cached
    /// across calls.
    pub fn is_pure(&self) -> bool {
        match self {
            Self::Constant { .. } => true,
            Self::Derived {
                program,
                seeds,
                internal_field,
                ..
            } => {
                internal_field.is_none()
                    && program.is_pure()
                    && seeds.iter().all(|seed| match seed {
                        Seed::Static(_) => true,
                        Seed::Dynamic(lookup) => lookup.is_pure(),
                    })
            }
            Self::Field { .. } | Self::TableSlice { .. } | Self::DerivedTable { .. } => false,
        }
    }

    /// Load-time checks on names, seed limits and internal fields.
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            Self::Constant { name, .. } if name.is_empty() => {
                Err(Error::config("constant lookup without a name"))
            }
            Self::Constant { .. } => Ok(()),
            Self::Derived {
                name,
                program,
                seeds,
                internal_field,
                ..
            } => {
                if seeds.len() > crate::codec::MAX_SEEDS {
                    return Err(Error::config(format!(
                        "{name} has {} seeds, max {}",
                        seeds.len(),
                        crate::codec::MAX_SEEDS
                    )));
                }
                if let Some(field) = internal_field
                    && (field.type_name.is_empty() || field.location.is_empty())
                {
                    return Err(Error::config(format!("{name} has an incomplete internal field")));
                }
                program.validate()?;
                for seed in seeds {
                    match seed {
                        Seed::Static(bytes) if bytes.len() > crate::codec::MAX_SEED_LEN => {
                            return Err(Error::config(format!(
                                "{name} has a static seed of {} bytes",
                                bytes.len()
                            )));
                        }
                        Seed::Static(_) => {}
                        Seed::Dynamic(lookup) => lookup.validate()?,
                    }
                }
                Ok(())
            }
            Self::Field { name, path, .. } if path.is_empty() => {
                Err(Error::config(format!("field lookup {name} has an empty path")))
            }
            Self::DerivedTable { accounts, .. } => accounts.validate(),
            Self::Field { .. } | Self::TableSlice { .. } => Ok(()),
        }
    }

    /// Schema type names referenced through internal fields, for load-time checks.
    pub fn internal_types(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_internal_types(&mut out);
        out
    }

    fn collect_internal_types<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Derived {
                program,
                seeds,
                internal_field,
                ..
            } => {
                if let Some(field) = internal_field {
                    out.push(&field.type_name);
                }
                program.collect_internal_types(out);
                for seed in seeds {
                    if let Seed::Dynamic(lookup) = seed {
                        lookup.collect_internal_types(out);
                    }
                }
            }
            Self::DerivedTable { accounts, .. } => accounts.collect_internal_types(out),
            Self::Constant { .. } | Self::Field { .. } | Self::TableSlice { .. } => {}
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::panic, reason = "test assertions")]
mod tests {
    use super::*;
    use crate::types::SYSTEM_PROGRAM_ID;
    use serde_json::json;

    fn router() -> Lookup {
        Lookup::constant("Router", Address::new_from_array([7; 32]), false, false)
    }

    #[test]
    fn equal_trees_share_a_fingerprint() {
        let a = Lookup::derived("Config", router(), vec![Seed::literal(b"config")]);
        let b = Lookup::derived("Config", router(), vec![Seed::literal(b"config")]);
        let c = Lookup::derived("Config", router(), vec![Seed::literal(b"state")]);
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }

    #[test]
    fn purity_follows_the_subtree() {
        let pure = Lookup::derived("Config", router(), vec![Seed::literal(b"config")]);
        assert!(pure.is_pure());
        let from_report = Lookup::derived(
            "SourceChain",
            router(),
            vec![Seed::field("Info.ChainSel", IdlType::U64)],
        );
        assert!(!from_report.is_pure());
        assert!(!pure.clone().with_internal_field("Registry", "LookupTable").is_pure());
    }

    #[test]
    fn validation_checks_seed_limits() {
        let too_many = Lookup::derived("Pda", router(), vec![Seed::literal(b"s"); 16]);
        assert!(matches!(too_many.validate(), Err(Error::Config { .. })));
        let long_seed = Lookup::derived("Pda", router(), vec![Seed::literal(&[0; 33])]);
        assert!(long_seed.validate().is_err());
        let system = Lookup::constant("SystemProgram", SYSTEM_PROGRAM_ID, false, false);
        assert!(system.validate().is_ok());
        assert!(
            Lookup::derived("Registry", system, vec![])
                .with_internal_field("", "LookupTable")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn json_shape() {
        let lookup: Lookup = serde_json::from_value(json!({
            "kind": "field",
            "name": "UserAccounts",
            "path": "Message.Accounts",
            "is_writable": {"bitmap_path": "Message.IsWritableBitmap"}
        }))
        .unwrap();
        let Lookup::Field {
            value_type,
            is_writable,
            is_signer,
            ..
        } = &lookup
        else {
            panic!("expected a field lookup");
        };
        assert_eq!(*value_type, IdlType::Pubkey);
        assert_eq!(*is_signer, MetaFlag::Value(false));
        assert_eq!(
            *is_writable,
            MetaFlag::Bitmap {
                bitmap_path: "Message.IsWritableBitmap".into()
            }
        );
        let seed: Seed = serde_json::from_value(json!({"static": "0x636f6e666967"})).unwrap();
        assert_eq!(seed, Seed::literal(b"config"));
    }
}
