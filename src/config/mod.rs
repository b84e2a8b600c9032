//! Declarative reader and writer configuration.
//!
//! Documents are JSON, loaded once at startup with [`ReaderConfig::from_json`] /
//! [`WriterConfig::from_json`] and immutable afterwards. Loading validates everything that
//! can be checked without touching the chain.

pub mod ccip;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::{Idl, IdlType, SchemaRegistry};
use crate::error::Error;
use crate::lookup::{Lookup, Seed};
use crate::modifiers::Modifier;
use crate::path;
use crate::types::{Address, base58, duration_secs, hex_bytes};

pub const CONFIG_VERSION: u32 = 1;
/// Largest instruction data accepted inline before buffering kicks in.
pub const DEFAULT_MAX_INSTRUCTION_DATA_LEN: usize = 1232;
pub const MAX_INDEXED_FIELDS: usize = 3;

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_max_data_len() -> usize {
    DEFAULT_MAX_INSTRUCTION_DATA_LEN
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum ReadType {
    #[default]
    Account,
    Event,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdaSeed {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: IdlType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdaDefinition {
    #[serde(with = "hex_bytes")]
    pub prefix: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seeds: Vec<PdaSeed>,
}

impl PdaDefinition {
    pub fn new(prefix: &[u8]) -> Self {
        Self {
            prefix: prefix.to_vec(),
            seeds: Vec::new(),
        }
    }

    #[must_use]
    pub fn seed(mut self, name: &str, ty: IdlType) -> Self {
        self.seeds.push(PdaSeed {
            name: name.to_string(),
            ty,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedField {
    pub off_chain_name: String,
    pub on_chain_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDefinition {
    #[serde(with = "duration_secs")]
    pub retention: Duration,
    #[serde(default)]
    pub include_reverted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexed_fields: Vec<IndexedField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiReader {
    #[serde(default)]
    pub reuse_params: bool,
    pub reads: Vec<ReadDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadDefinition {
    pub chain_specific_name: String,
    #[serde(default)]
    pub read_type: ReadType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pda_definition: Option<PdaDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_definition: Option<EventDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_modifiers: Vec<Modifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub output_modifiers: Vec<Modifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_reader: Option<MultiReader>,
}

impl ReadDefinition {
    pub fn account(chain_specific_name: &str, pda: PdaDefinition) -> Self {
        Self {
            chain_specific_name: chain_specific_name.to_string(),
            read_type: ReadType::Account,
            pda_definition: Some(pda),
            event_definition: None,
            input_modifiers: Vec::new(),
            output_modifiers: Vec::new(),
            multi_reader: None,
        }
    }

    pub fn event(chain_specific_name: &str, event: EventDefinition) -> Self {
        Self {
            chain_specific_name: chain_specific_name.to_string(),
            read_type: ReadType::Event,
            pda_definition: None,
            event_definition: Some(event),
            input_modifiers: Vec::new(),
            output_modifiers: Vec::new(),
            multi_reader: None,
        }
    }

    #[must_use]
    pub fn input(mut self, modifiers: Vec<Modifier>) -> Self {
        self.input_modifiers = modifiers;
        self
    }

    #[must_use]
    pub fn output(mut self, modifiers: Vec<Modifier>) -> Self {
        self.output_modifiers = modifiers;
        self
    }

    #[must_use]
    pub fn with_multi_reader(mut self, reuse_params: bool, reads: Vec<ReadDefinition>) -> Self {
        self.multi_reader = Some(MultiReader {
            reuse_params,
            reads,
        });
        self
    }

    fn validate(&self, namespace: &str, operation: &str, idl: &Idl) -> Result<(), Error> {
        let at = format!("{namespace}.{operation}");
        match (self.read_type, &self.pda_definition, &self.event_definition) {
            (ReadType::Account, Some(pda), None) => {
                if idl.type_def(&self.chain_specific_name).is_none() {
                    return Err(Error::config(format!(
                        "{at}: {} is not defined by the {} schema",
                        self.chain_specific_name, idl.name
                    )));
                }
                let fan_out = pda
                    .seeds
                    .iter()
                    .filter(|s| matches!(s.ty, IdlType::Vec(_)) && !s.ty.is_byte_like())
                    .count();
                if fan_out > 1 {
                    return Err(Error::config(format!(
                        "{at}: at most one vector seed may fan out"
                    )));
                }
                if pda.seeds.len() + 1 > crate::codec::MAX_SEEDS {
                    return Err(Error::config(format!("{at}: too many seeds")));
                }
            }
            (ReadType::Event, None, Some(event)) => {
                if idl.event(&self.chain_specific_name).is_none() {
                    return Err(Error::config(format!(
                        "{at}: event {} is not defined by the {} schema",
                        self.chain_specific_name, idl.name
                    )));
                }
                if event.indexed_fields.len() > MAX_INDEXED_FIELDS {
                    return Err(Error::config(format!(
                        "{at}: {} indexed fields, max {MAX_INDEXED_FIELDS}",
                        event.indexed_fields.len()
                    )));
                }
            }
            (read_type, _, _) => {
                return Err(Error::config(format!(
                    "{at}: {read_type} read must carry exactly the matching definition"
                )));
            }
        }
        for modifier in self.input_modifiers.iter().chain(&self.output_modifiers) {
            modifier.validate()?;
        }
        if let Some(multi) = &self.multi_reader {
            for sub in &multi.reads {
                sub.validate(namespace, operation, idl)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub idl: Idl,
    pub reads: BTreeMap<String, ReadDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Namespaces deployed at one shared address.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub address_share_groups: Vec<Vec<String>>,
    pub namespaces: BTreeMap<String, NamespaceConfig>,
}

impl ReaderConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid reader config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), Error> {
        check_version(self.version)?;
        for (namespace, ns) in &self.namespaces {
            ns.idl.validate()?;
            for (operation, read) in &ns.reads {
                read.validate(namespace, operation, &ns.idl)?;
            }
        }
        let mut seen = BTreeSet::new();
        for group in &self.address_share_groups {
            for member in group {
                if !self.namespaces.contains_key(member) {
                    return Err(Error::config(format!(
                        "share group member {member} is not a configured namespace"
                    )));
                }
                if !seen.insert(member.as_str()) {
                    return Err(Error::config(format!(
                        "namespace {member} appears in more than one share group"
                    )));
                }
            }
        }
        debug!(namespaces = self.namespaces.len(), "reader config validated");
        Ok(())
    }

    /// The share group containing `namespace`, or just `namespace` itself.
    pub fn share_group(&self, namespace: &str) -> Vec<String> {
        self.address_share_groups
            .iter()
            .find(|group| group.iter().any(|m| m == namespace))
            .cloned()
            .unwrap_or_else(|| vec![namespace.to_string()])
    }

    pub fn schema_registry(&self) -> Result<SchemaRegistry, Error> {
        let mut registry = SchemaRegistry::new();
        for (namespace, ns) in &self.namespaces {
            registry.register(namespace, ns.idl.clone())?;
        }
        Ok(registry)
    }
}

/// Union of several reader configs. Later namespaces replace earlier ones of the same
/// name; share groups that overlap are joined into one.
pub fn merge_reader_configs(configs: &[ReaderConfig]) -> ReaderConfig {
    let mut namespaces = BTreeMap::new();
    let mut groups: Vec<BTreeSet<String>> = Vec::new();
    for config in configs {
        namespaces.extend(
            config
                .namespaces
                .iter()
                .map(|(name, ns)| (name.clone(), ns.clone())),
        );
        for group in &config.address_share_groups {
            let mut merged: BTreeSet<String> = group.iter().cloned().collect();
            groups.retain(|existing| {
                if existing.is_disjoint(&merged) {
                    true
                } else {
                    merged.extend(existing.iter().cloned());
                    false
                }
            });
            groups.push(merged);
        }
    }
    ReaderConfig {
        version: CONFIG_VERSION,
        address_share_groups: groups
            .into_iter()
            .map(|group| group.into_iter().collect())
            .collect(),
        namespaces,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedLookupTable {
    pub name: String,
    pub accounts: Lookup,
    #[serde(default)]
    pub optional: bool,
}

impl DerivedLookupTable {
    pub fn as_lookup(&self) -> Lookup {
        Lookup::DerivedTable {
            name: self.name.clone(),
            accounts: Box::new(self.accounts.clone()),
            optional: self.optional,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTables {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived: Vec<DerivedLookupTable>,
    #[serde(
        default,
        rename = "static",
        with = "base58::vec",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub static_tables: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtaLookup {
    pub name: String,
    pub mint_path: String,
    pub owner: Lookup,
    pub token_program: Lookup,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArgsTransform {
    /// Adds `TokenIndexes`: the position of each pool lookup table of `table` in the
    /// final account list.
    CcipTokenIndexes { table: String },
}

/// Stages oversized payloads through a separate buffer instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferMethod {
    pub chain_specific_name: String,
    pub chunk_size: usize,
    #[serde(with = "hex_bytes")]
    pub seed_prefix: Vec<u8>,
    /// Instruction argument moved into the buffer; sent empty in the final instruction.
    pub buffered_arg: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodConfig {
    #[serde(with = "base58")]
    pub from_address: Address,
    pub chain_specific_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_modifiers: Vec<Modifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args_transform: Option<ArgsTransform>,
    #[serde(default)]
    pub accounts: Vec<Lookup>,
    #[serde(default)]
    pub lookup_tables: LookupTables,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub atas: Vec<AtaLookup>,
    #[serde(default)]
    pub compute_unit_overhead: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_method: Option<BufferMethod>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub debug_path: String,
}

impl MethodConfig {
    fn validate(&self, program: &str, method: &str, idl: &Idl, max_len: usize) -> Result<(), Error> {
        let at = format!("{program}.{method}");
        if self.from_address == Address::default() {
            return Err(Error::config(format!("{at}: from address cannot be empty")));
        }
        let Some(ix) = idl.instruction(&self.chain_specific_name) else {
            return Err(Error::config(format!(
                "{at}: instruction {} is not defined by the {} schema",
                self.chain_specific_name, idl.name
            )));
        };
        for modifier in &self.input_modifiers {
            modifier.validate()?;
        }

        let tables: BTreeSet<&str> = self
            .lookup_tables
            .derived
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        let mut lookups: Vec<&Lookup> = self.accounts.iter().collect();
        lookups.extend(self.lookup_tables.derived.iter().map(|t| &t.accounts));
        for ata in &self.atas {
            lookups.push(&ata.owner);
            lookups.push(&ata.token_program);
        }
        for lookup in lookups {
            lookup.validate()?;
            for type_name in lookup.internal_types() {
                if idl.type_def(type_name).is_none() {
                    return Err(Error::config(format!(
                        "{at}: internal field type {type_name} is not defined by the {} schema",
                        idl.name
                    )));
                }
            }
            for table in table_references(lookup) {
                if !tables.contains(table) {
                    return Err(Error::config(format!(
                        "{at}: lookup table {table} is sliced but never derived"
                    )));
                }
            }
        }

        if let Some(ArgsTransform::CcipTokenIndexes { table }) = &self.args_transform {
            if !tables.contains(table.as_str()) {
                return Err(Error::config(format!(
                    "{at}: args transform references unknown table {table}"
                )));
            }
            if !has_arg(ix, "TokenIndexes") {
                return Err(Error::config(format!(
                    "{at}: {} takes no token_indexes argument",
                    ix.name
                )));
            }
        }

        if let Some(buffer) = &self.buffer_method {
            let Some(buffer_ix) = idl.instruction(&buffer.chain_specific_name) else {
                return Err(Error::config(format!(
                    "{at}: buffer instruction {} is not defined",
                    buffer.chain_specific_name
                )));
            };
            if !has_arg(ix, &buffer.buffered_arg) {
                return Err(Error::config(format!(
                    "{at}: buffered argument {} is not an argument of {}",
                    buffer.buffered_arg, ix.name
                )));
            }
            if buffer.chunk_size == 0 || buffer.chunk_size >= max_len {
                return Err(Error::config(format!(
                    "{at}: buffer chunk size must be between 1 and {max_len}"
                )));
            }
            if buffer.seed_prefix.len() > crate::codec::MAX_SEED_LEN {
                return Err(Error::config(format!("{at}: buffer seed prefix too long")));
            }
            for arg in ["BufferId", "Chunk", "ChunkIndex", "NumChunks", "ReportLength"] {
                if !has_arg(buffer_ix, arg) {
                    return Err(Error::config(format!(
                        "{at}: buffer instruction {} lacks argument {arg}",
                        buffer_ix.name
                    )));
                }
            }
        }
        Ok(())
    }
}

fn has_arg(ix: &crate::codec::IdlInstruction, name: &str) -> bool {
    let wanted = path::normalize_name(name);
    ix.args.iter().any(|a| path::normalize_name(&a.name) == wanted)
}

fn table_references(lookup: &Lookup) -> Vec<&str> {
    match lookup {
        Lookup::TableSlice { table_name, .. } => vec![table_name.as_str()],
        Lookup::Derived { program, seeds, .. } => {
            let mut out = table_references(program);
            for seed in seeds {
                if let Seed::Dynamic(inner) = seed {
                    out.extend(table_references(inner));
                }
            }
            out
        }
        Lookup::DerivedTable { accounts, .. } => table_references(accounts),
        Lookup::Constant { .. } | Lookup::Field { .. } => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    #[serde(with = "base58")]
    pub address: Address,
    pub idl: Idl,
    pub methods: BTreeMap<String, MethodConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default = "default_max_data_len")]
    pub max_instruction_data_len: usize,
    pub programs: BTreeMap<String, ProgramConfig>,
}

impl WriterConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("invalid writer config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), Error> {
        check_version(self.version)?;
        for (name, program) in &self.programs {
            if program.address == Address::default() {
                return Err(Error::config(format!("program {name} has a zero address")));
            }
            program.idl.validate()?;
            for (method, config) in &program.methods {
                config.validate(name, method, &program.idl, self.max_instruction_data_len)?;
            }
        }
        debug!(programs = self.programs.len(), "writer config validated");
        Ok(())
    }

    pub fn schema_registry(&self) -> Result<SchemaRegistry, Error> {
        let mut registry = SchemaRegistry::new();
        for (name, program) in &self.programs {
            registry.register(name, program.idl.clone())?;
        }
        Ok(registry)
    }
}

fn check_version(version: u32) -> Result<(), Error> {
    if version != CONFIG_VERSION {
        return Err(Error::config(format!(
            "unsupported config version {version}, expected {CONFIG_VERSION}"
        )));
    }
    Ok(())
}
