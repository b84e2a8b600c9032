//! Assembles write instructions: resolves the configured account list, lookup tables and
//! associated token accounts for a report, encodes the arguments, and stages oversized
//! payloads through a buffer account.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::{Instrument, debug, info_span, trace, warn};

use crate::client::ChainClient;
use crate::codec;
use crate::config::{ArgsTransform, AtaLookup, BufferMethod, MethodConfig, WriterConfig};
use crate::error::{Error, WriteAssemblyError};
use crate::lookup::LookupResolver;
use crate::modifiers;
use crate::path;
use crate::scope::{CallOptions, CallScope, TableContents};
use crate::types::{
    ASSOCIATED_TOKEN_PROGRAM_ID, AccountMeta, Address, Instruction, Record, SYSTEM_PROGRAM_ID,
};

/// Everything needed to build the transaction for one write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledInstruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
    /// Lookup tables to attach to the transaction, keyed by table address.
    pub lookup_tables: BTreeMap<Address, Vec<Address>>,
    /// Buffer instructions that must land before the final instruction.
    pub staged: Vec<Instruction>,
    pub compute_unit_overhead: u32,
    pub debug_id: Option<String>,
}

impl AssembledInstruction {
    pub fn instruction(&self) -> Instruction {
        Instruction {
            program_id: self.program_id,
            accounts: self.accounts.clone(),
            data: self.data.clone(),
        }
    }
}

pub struct WriteAssembler {
    config: Arc<WriterConfig>,
    resolver: LookupResolver,
}

impl WriteAssembler {
    pub fn new(config: WriterConfig, client: Arc<dyn ChainClient>) -> Result<Self, Error> {
        config.validate()?;
        let schemas = Arc::new(config.schema_registry()?);
        Ok(Self {
            config: Arc::new(config),
            resolver: LookupResolver::new(client, schemas),
        })
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub async fn build_instruction(
        &self,
        program: &str,
        method: &str,
        payload: &Record,
        options: &CallOptions,
    ) -> Result<AssembledInstruction, Error> {
        let Some((program_id, method_config)) = self.config.programs.get(program).and_then(|p| {
            p.methods.get(method).map(|m| (p.address, m))
        }) else {
            return Err(WriteAssemblyError::UnknownMethod {
                program: program.to_string(),
                method: method.to_string(),
            }
            .into());
        };
        let scope = CallScope::new(program, options);
        scope.begin();
        let span = info_span!("build_instruction", program, method);
        let result = self
            .assemble(program, program_id, method_config, payload, &scope)
            .instrument(span)
            .await;
        if let Err(e) = &result {
            warn!(program, method, error = %e, "write assembly failed");
        }
        scope.finish(result)
    }

    /// Build, then send any staged buffer chunks followed by the final instruction.
    /// Returns the final transaction id.
    pub async fn submit(
        &self,
        program: &str,
        method: &str,
        payload: &Record,
        options: &CallOptions,
    ) -> Result<String, Error> {
        let assembled = self
            .build_instruction(program, method, payload, options)
            .await?;
        let scope = CallScope::new(program, options);
        scope.begin();
        let client = self.resolver.client();
        let result = async {
            for (index, chunk) in assembled.staged.iter().enumerate() {
                let tx = scope
                    .guarded("submit_buffer", client.submit_instruction(chunk))
                    .await?;
                trace!(chunk = index, tx = %tx, "buffer chunk submitted");
            }
            let tx = scope
                .guarded("submit", client.submit_instruction(&assembled.instruction()))
                .await?;
            debug!(
                program,
                method,
                tx = %tx,
                debug_id = assembled.debug_id.as_deref().unwrap_or_default(),
                "instruction submitted"
            );
            Ok(tx)
        }
        .await;
        scope.finish(result)
    }

    async fn assemble(
        &self,
        program: &str,
        program_id: Address,
        method: &MethodConfig,
        payload: &Record,
        scope: &CallScope,
    ) -> Result<AssembledInstruction, Error> {
        let payload = modifiers::apply_input(&method.input_modifiers, payload.clone());
        let debug_id = debug_id(&payload, &method.debug_path);
        let report = &payload;

        try_join_all(method.lookup_tables.derived.iter().map(|table| async move {
            let lookup = table.as_lookup();
            let entries = self.resolver.resolve(&lookup, report, scope).await?;
            if entries.is_empty() && !table.optional {
                return Err(Error::from(WriteAssemblyError::RequiredAccountUnresolved {
                    name: table.name.clone(),
                }));
            }
            Ok(())
        }))
        .await?;

        let static_tables = try_join_all(method.lookup_tables.static_tables.iter().map(
            |address| async move {
                let data = scope
                    .account(self.resolver.client(), *address)
                    .await?
                    .ok_or_else(|| {
                        Error::resolution(address.to_string(), "static lookup table does not exist")
                    })?;
                Ok::<_, Error>((*address, codec::decode_lookup_table(&data)?))
            },
        ))
        .await?;
        let mut lookup_tables: BTreeMap<Address, Vec<Address>> = scope.tables();
        lookup_tables.extend(static_tables);

        let resolved = try_join_all(
            method
                .accounts
                .iter()
                .map(|lookup| self.resolver.resolve(lookup, report, scope)),
        )
        .await?;
        let mut accounts = Vec::new();
        for (lookup, metas) in method.accounts.iter().zip(resolved) {
            if metas.is_empty() {
                if lookup.is_optional() {
                    trace!(lookup = lookup.name(), "optional account absent, omitted");
                    continue;
                }
                return Err(WriteAssemblyError::RequiredAccountUnresolved {
                    name: lookup.name().to_string(),
                }
                .into());
            }
            accounts.extend(metas);
        }

        for ata in &method.atas {
            accounts.extend(self.associated_token_accounts(ata, report, scope).await?);
        }

        let mut args = payload.clone();
        if let Some(ArgsTransform::CcipTokenIndexes { table }) = &method.args_transform {
            let tables = scope.table(table).unwrap_or_default();
            let indexes = token_indexes(&accounts, &tables)?;
            path::insert(
                &mut args,
                "TokenIndexes",
                Value::Array(indexes.into_iter().map(Value::from).collect()),
            );
        }

        let schemas = self.resolver.schemas();
        let limit = self.config.max_instruction_data_len;
        let mut data = schemas.encode_instruction(program, &method.chain_specific_name, &args)?;
        let mut staged = Vec::new();
        if data.len() > limit {
            let Some(buffer) = &method.buffer_method else {
                return Err(WriteAssemblyError::PayloadTooLarge {
                    len: data.len(),
                    limit,
                }
                .into());
            };
            let (chunks, buffer_address) =
                self.stage_buffer(program, program_id, method, buffer, &mut args)?;
            data = schemas.encode_instruction(program, &method.chain_specific_name, &args)?;
            if data.len() > limit {
                return Err(WriteAssemblyError::PayloadTooLarge {
                    len: data.len(),
                    limit,
                }
                .into());
            }
            debug!(chunks = chunks.len(), buffer = %buffer_address, "payload staged through buffer");
            accounts.push(AccountMeta::new(buffer_address, false, true));
            staged = chunks;
        }

        debug!(
            accounts = accounts.len(),
            data_len = data.len(),
            debug_id = debug_id.as_deref().unwrap_or_default(),
            "instruction assembled"
        );
        Ok(AssembledInstruction {
            program_id,
            accounts,
            data,
            lookup_tables,
            staged,
            compute_unit_overhead: method.compute_unit_overhead,
            debug_id,
        })
    }

    async fn associated_token_accounts(
        &self,
        ata: &AtaLookup,
        report: &Record,
        scope: &CallScope,
    ) -> Result<Vec<AccountMeta>, Error> {
        let mints = path::get_all_flat(report, &ata.mint_path)
            .into_iter()
            .map(codec::value_to_address)
            .collect::<Result<Vec<_>, _>>()?;
        let (owners, programs) = futures::try_join!(
            self.resolver.resolve(&ata.owner, report, scope),
            self.resolver.resolve(&ata.token_program, report, scope),
        )?;
        if mints.is_empty() || owners.is_empty() || programs.is_empty() {
            if ata.optional {
                trace!(ata = %ata.name, "optional token account absent, omitted");
                return Ok(Vec::new());
            }
            return Err(WriteAssemblyError::RequiredAccountUnresolved {
                name: ata.name.clone(),
            }
            .into());
        }
        let mut out = Vec::with_capacity(mints.len());
        for (i, mint) in mints.iter().enumerate() {
            let (Some(owner), Some(token_program)) = (
                owners.get(i).or(owners.first()),
                programs.get(i).or(programs.first()),
            ) else {
                continue;
            };
            let address = self
                .resolver
                .client()
                .derive_address(
                    &ASSOCIATED_TOKEN_PROGRAM_ID,
                    &[
                        owner.address.as_ref(),
                        token_program.address.as_ref(),
                        mint.as_ref(),
                    ],
                )
                .ok_or_else(|| Error::resolution(&ata.name, "no valid associated token address"))?;
            out.push(AccountMeta::new(address, false, true));
        }
        Ok(out)
    }

    /// Split the buffered argument into chunk instructions and blank it in `args`.
    fn stage_buffer(
        &self,
        program: &str,
        program_id: Address,
        method: &MethodConfig,
        buffer: &BufferMethod,
        args: &mut Record,
    ) -> Result<(Vec<Instruction>, Address), Error> {
        let raw = args
            .as_object()
            .and_then(|map| path::get_key(map, &buffer.buffered_arg))
            .ok_or_else(|| {
                Error::codec(format!("missing buffered argument {}", buffer.buffered_arg))
            })?;
        let raw = codec::value_to_bytes(raw)?;

        let mut buffer_id = [0u8; 32];
        buffer_id.copy_from_slice(&Sha256::digest(&raw));
        let buffer_address = self
            .resolver
            .client()
            .derive_address(
                &program_id,
                &[
                    buffer.seed_prefix.as_slice(),
                    buffer_id.as_slice(),
                    method.from_address.as_ref(),
                ],
            )
            .ok_or_else(|| Error::resolution("buffer", "no valid buffer address"))?;

        let chunks: Vec<&[u8]> = raw.chunks(buffer.chunk_size).collect();
        let num_chunks = u8::try_from(chunks.len())
            .map_err(|_| WriteAssemblyError::IndexOutOfRange { index: chunks.len() })?;
        let report_length = u32::try_from(raw.len())
            .map_err(|_| Error::codec("buffered argument longer than u32::MAX"))?;
        let metas = vec![
            AccountMeta::new(buffer_address, false, true),
            AccountMeta::new(method.from_address, true, true),
            AccountMeta::readonly(SYSTEM_PROGRAM_ID),
        ];
        let schemas = self.resolver.schemas();
        let instructions = chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let chunk_args = json!({
                    "BufferId": format!("0x{}", hex::encode(buffer_id)),
                    "ReportLength": report_length,
                    "Chunk": format!("0x{}", hex::encode(chunk)),
                    "ChunkIndex": index,
                    "NumChunks": num_chunks,
                });
                Ok(Instruction {
                    program_id,
                    accounts: metas.clone(),
                    data: schemas.encode_instruction(
                        program,
                        &buffer.chain_specific_name,
                        &chunk_args,
                    )?,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        path::insert(args, &buffer.buffered_arg, Value::String("0x".to_string()));
        Ok((instructions, buffer_address))
    }
}

/// Position of each pool lookup table in the final account list.
fn token_indexes(accounts: &[AccountMeta], tables: &TableContents) -> Result<Vec<u8>, Error> {
    tables
        .iter()
        .map(|(table, _)| {
            let index = accounts
                .iter()
                .position(|meta| meta.address == *table)
                .ok_or_else(|| WriteAssemblyError::MissingTokenPool {
                    table: table.to_string(),
                })?;
            Ok(u8::try_from(index).map_err(|_| WriteAssemblyError::IndexOutOfRange { index })?)
        })
        .collect()
}

fn debug_id(payload: &Record, debug_path: &str) -> Option<String> {
    if debug_path.is_empty() {
        return None;
    }
    path::get_first(payload, debug_path).map(|value| match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}
