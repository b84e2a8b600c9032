//! Executes configured reads: account reads through derived addresses, event reads
//! through the client's log query, and multi-reads that merge several of either.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, join_all, try_join_all};
use serde_json::{Map, Value};
use tracing::{debug, info_span, warn, Instrument};

use crate::client::ChainClient;
use crate::codec::{self, IdlType, SchemaRegistry};
use crate::config::{EventDefinition, PdaDefinition, ReadDefinition, ReadType, ReaderConfig};
use crate::error::Error;
use crate::modifiers;
use crate::path;
use crate::scope::{CallOptions, CallScope};
use crate::types::{Address, EventFilter, IndexedFilter, Record};

/// One entry of a [`ReadExecutor::batch_read`].
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub namespace: String,
    pub operation: String,
    pub params: Record,
}

impl ReadRequest {
    pub fn new(namespace: &str, operation: &str, params: Record) -> Self {
        Self {
            namespace: namespace.to_string(),
            operation: operation.to_string(),
            params,
        }
    }
}

pub struct ReadExecutor {
    config: Arc<ReaderConfig>,
    client: Arc<dyn ChainClient>,
    schemas: SchemaRegistry,
    bindings: DashMap<String, Address>,
}

/// The read being served: which definition, under which bound program.
#[derive(Clone, Copy)]
struct ReadTarget<'a> {
    namespace: &'a str,
    operation: &'a str,
    def: &'a ReadDefinition,
    program: Address,
}

impl ReadExecutor {
    pub fn new(config: ReaderConfig, client: Arc<dyn ChainClient>) -> Result<Self, Error> {
        config.validate()?;
        let schemas = config.schema_registry()?;
        Ok(Self {
            config: Arc::new(config),
            client,
            schemas,
            bindings: DashMap::new(),
        })
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Bind `namespace` (and every namespace sharing its address) to a deployed program.
    ///
    /// Rebinding to the same address is a no-op; a different address is rejected.
    pub fn bind(&self, namespace: &str, address: Address) -> Result<(), Error> {
        if !self.config.namespaces.contains_key(namespace) {
            return Err(Error::config(format!("unknown namespace {namespace}")));
        }
        if address == Address::default() {
            return Err(Error::config(format!(
                "cannot bind {namespace} to the zero address"
            )));
        }
        let group = self.config.share_group(namespace);
        for member in &group {
            if let Some(existing) = self.bindings.get(member)
                && *existing != address
            {
                return Err(Error::config(format!(
                    "{member} is already bound to {}, refusing {address}",
                    *existing
                )));
            }
        }
        for member in group {
            debug!(namespace = %member, %address, "bound namespace");
            self.bindings.insert(member, address);
        }
        Ok(())
    }

    pub fn bound_address(&self, namespace: &str) -> Option<Address> {
        self.bindings.get(namespace).map(|entry| *entry)
    }

    pub async fn execute_read(
        &self,
        namespace: &str,
        operation: &str,
        params: &Record,
        options: &CallOptions,
    ) -> Result<Record, Error> {
        let def = self
            .config
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.reads.get(operation))
            .ok_or_else(|| Error::Read {
                operation: format!("{namespace}.{operation}"),
                reason: "no such read is configured".to_string(),
            })?;
        let scope = CallScope::new(namespace, options);
        scope.begin();
        let span = info_span!("execute_read", namespace, operation);
        let result = self
            .run_definition(namespace, operation, def, params, &scope)
            .instrument(span)
            .await;
        if let Err(e) = &result {
            warn!(namespace, operation, error = %e, "read failed");
        }
        scope.finish(result)
    }

    /// Run independent reads concurrently. One failure does not affect the others.
    pub async fn batch_read(
        &self,
        requests: &[ReadRequest],
        options: &CallOptions,
    ) -> Vec<Result<Record, Error>> {
        join_all(requests.iter().map(|r| {
            self.execute_read(&r.namespace, &r.operation, &r.params, options)
        }))
        .await
    }

    fn run_definition<'a>(
        &'a self,
        namespace: &'a str,
        operation: &'a str,
        def: &'a ReadDefinition,
        params: &'a Record,
        scope: &'a CallScope,
    ) -> BoxFuture<'a, Result<Record, Error>> {
        async move {
            let primary = self.read_single(namespace, operation, def, params, scope);
            let Some(multi) = &def.multi_reader else {
                return primary.await;
            };
            let subs = multi.reads.iter().map(|sub| {
                let sub_params = if multi.reuse_params {
                    params.clone()
                } else {
                    params
                        .as_object()
                        .and_then(|map| path::get_key(map, &sub.chain_specific_name))
                        .cloned()
                        .unwrap_or_else(|| Value::Object(Map::new()))
                };
                async move {
                    self.run_definition(namespace, operation, sub, &sub_params, scope)
                        .await
                }
            });
            let (first, rest) = futures::try_join!(primary, try_join_all(subs))?;
            rest.into_iter()
                .try_fold(first, |acc, next| merge_records(operation, acc, next))
        }
        .boxed()
    }

    async fn read_single(
        &self,
        namespace: &str,
        operation: &str,
        def: &ReadDefinition,
        params: &Record,
        scope: &CallScope,
    ) -> Result<Record, Error> {
        let program = self.bound_address(namespace).ok_or_else(|| Error::Read {
            operation: operation.to_string(),
            reason: format!("namespace {namespace} is not bound to an address"),
        })?;
        let params = modifiers::apply_input(&def.input_modifiers, params.clone());
        let target = ReadTarget {
            namespace,
            operation,
            def,
            program,
        };
        match (def.read_type, &def.pda_definition, &def.event_definition) {
            (ReadType::Account, Some(pda), _) => {
                self.read_account(target, pda, &params, scope).await
            }
            (ReadType::Event, _, Some(event)) => {
                self.read_events(target, event, &params, scope).await
            }
            (read_type, _, _) => Err(Error::config(format!(
                "{namespace}.{operation}: {read_type} read has no matching definition"
            ))),
        }
    }

    /// Caller params become PDA seeds here, so the address is derived per call and never
    /// enters the resolver's cross-call cache.
    async fn read_account(
        &self,
        target: ReadTarget<'_>,
        pda: &PdaDefinition,
        params: &Record,
        scope: &CallScope,
    ) -> Result<Record, Error> {
        let ReadTarget {
            namespace,
            operation,
            def,
            program,
        } = target;
        let (seed_sets, fans_out) = self.seed_sets(operation, namespace, pda, params)?;
        let reads = seed_sets.into_iter().map(|seeds| async move {
            let mut all: Vec<&[u8]> = vec![pda.prefix.as_slice()];
            all.extend(seeds.iter().map(Vec::as_slice));
            let address = self
                .client
                .derive_address(&program, &all)
                .ok_or_else(|| Error::Read {
                    operation: operation.to_string(),
                    reason: format!(
                        "no viable {} address under {program}",
                        def.chain_specific_name
                    ),
                })?;
            let data = scope
                .account(self.client.as_ref(), address)
                .await?
                .ok_or_else(|| Error::Read {
                    operation: operation.to_string(),
                    reason: format!("account {address} does not exist"),
                })?;
            let record = self
                .schemas
                .decode_account(namespace, &def.chain_specific_name, &data)?;
            modifiers::apply_output(&def.output_modifiers, record, Some(&program))
        });
        let mut records = try_join_all(reads).await?;
        if fans_out {
            Ok(Value::Array(records))
        } else {
            records.pop().ok_or_else(|| Error::Read {
                operation: operation.to_string(),
                reason: "no account resolved".to_string(),
            })
        }
    }

    /// Encoded seeds for every account to read. A non-byte vector seed fans out into one
    /// seed set per element; the flag reports whether that happened.
    fn seed_sets(
        &self,
        operation: &str,
        namespace: &str,
        pda: &PdaDefinition,
        params: &Record,
    ) -> Result<(Vec<Vec<Vec<u8>>>, bool), Error> {
        let idl = self.schemas.idl(namespace)?;
        let mut sets: Vec<Vec<Vec<u8>>> = vec![Vec::new()];
        let mut fans_out = false;
        for seed in &pda.seeds {
            let value = params
                .as_object()
                .and_then(|map| path::get_key(map, &seed.name))
                .ok_or_else(|| Error::Read {
                    operation: operation.to_string(),
                    reason: format!("missing seed parameter {}", seed.name),
                })?;
            match &seed.ty {
                IdlType::Vec(inner) if !seed.ty.is_byte_like() => {
                    let items = value.as_array().ok_or_else(|| Error::Read {
                        operation: operation.to_string(),
                        reason: format!("seed parameter {} must be a list", seed.name),
                    })?;
                    let encoded = items
                        .iter()
                        .map(|item| codec::encode_seed(item, inner, Some(idl)))
                        .collect::<Result<Vec<_>, _>>()?;
                    fans_out = true;
                    sets = sets
                        .into_iter()
                        .flat_map(|set| {
                            encoded.iter().map(move |bytes| {
                                let mut next = set.clone();
                                next.push(bytes.clone());
                                next
                            })
                        })
                        .collect();
                }
                ty => {
                    let bytes = codec::encode_seed(value, ty, Some(idl))?;
                    for set in &mut sets {
                        set.push(bytes.clone());
                    }
                }
            }
        }
        Ok((sets, fans_out))
    }

    async fn read_events(
        &self,
        target: ReadTarget<'_>,
        event: &EventDefinition,
        params: &Record,
        scope: &CallScope,
    ) -> Result<Record, Error> {
        let ReadTarget {
            namespace,
            operation,
            def,
            program,
        } = target;
        let retention = i64::try_from(event.retention.as_secs()).unwrap_or(i64::MAX);
        let since = chrono::Utc::now().timestamp().saturating_sub(retention);
        let indexed: Vec<IndexedFilter> = event
            .indexed_fields
            .iter()
            .filter_map(|field| {
                path::get_first(params, &field.off_chain_name).map(|value| IndexedFilter {
                    on_chain_path: field.on_chain_path.clone(),
                    value: value.clone(),
                })
            })
            .collect();
        let filter = EventFilter {
            program_id: program,
            event_name: def.chain_specific_name.clone(),
            discriminator: codec::event_discriminator(&def.chain_specific_name),
            since,
            include_reverted: event.include_reverted,
            indexed,
        };

        let mut raw = scope
            .guarded(
                "fetch_events",
                self.client.fetch_events(&filter),
            )
            .await?;
        raw.sort_by_key(|e| (e.slot, e.log_index));

        let mut out = Vec::new();
        for ev in raw {
            if ev.program_id != program
                || (ev.reverted && !filter.include_reverted)
                || ev.block_time < filter.since
            {
                continue;
            }
            let Some(record) = self.schemas.decode_event(
                namespace,
                &def.chain_specific_name,
                &ev.data,
            )?
            else {
                continue;
            };
            let matches = filter.indexed.iter().all(|f| {
                path::get_first(&record, &f.on_chain_path)
                    .is_some_and(|v| codec::values_match(v, &f.value))
            });
            if matches {
                out.push(modifiers::apply_output(
                    &def.output_modifiers,
                    record,
                    Some(&program),
                )?);
            }
        }
        debug!(operation, events = out.len(), "event read complete");
        Ok(Value::Array(out))
    }
}

/// Field union of two read results; fields of `next` win.
fn merge_records(operation: &str, acc: Record, next: Record) -> Result<Record, Error> {
    match (acc, next) {
        (Value::Object(mut base), Value::Object(extra)) => {
            base.extend(extra);
            Ok(Value::Object(base))
        }
        _ => Err(Error::Read {
            operation: operation.to_string(),
            reason: "multi-read results must all be records".to_string(),
        }),
    }
}
