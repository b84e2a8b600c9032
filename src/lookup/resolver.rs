use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, try_join_all};
use tracing::{debug, trace};

use super::{Fingerprint, InternalField, Lookup, MetaFlag, Seed};
use crate::client::ChainClient;
use crate::codec::{self, MAX_SEEDS, SchemaRegistry};
use crate::error::Error;
use crate::path;
use crate::scope::CallScope;
use crate::types::{AccountMeta, Address, Record};

/// Resolves [`Lookup`] trees into account metas.
///
/// An empty result means the lookup is absent (a missing report field, a table that was
/// never derived, an account that does not exist). Callers decide whether absence is
/// fatal; [`LookupResolver::resolve_required`] is the strict form.
pub struct LookupResolver {
    client: Arc<dyn ChainClient>,
    schemas: Arc<SchemaRegistry>,
    pure: DashMap<Fingerprint, Vec<AccountMeta>>,
}

impl LookupResolver {
    pub fn new(client: Arc<dyn ChainClient>, schemas: Arc<SchemaRegistry>) -> Self {
        Self {
            client,
            schemas,
            pure: DashMap::new(),
        }
    }

    pub fn client(&self) -> &dyn ChainClient {
        self.client.as_ref()
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub async fn resolve(
        &self,
        lookup: &Lookup,
        report: &Record,
        scope: &CallScope,
    ) -> Result<Vec<AccountMeta>, Error> {
        self.resolve_at(lookup, report, scope, lookup.name().to_string())
            .await
    }

    pub async fn resolve_required(
        &self,
        lookup: &Lookup,
        report: &Record,
        scope: &CallScope,
    ) -> Result<Vec<AccountMeta>, Error> {
        let metas = self.resolve(lookup, report, scope).await?;
        if metas.is_empty() {
            return Err(Error::resolution(
                lookup.name(),
                "required lookup resolved to no accounts",
            ));
        }
        Ok(metas)
    }

    fn resolve_at<'a>(
        &'a self,
        lookup: &'a Lookup,
        report: &'a Record,
        scope: &'a CallScope,
        at: String,
    ) -> BoxFuture<'a, Result<Vec<AccountMeta>, Error>> {
        async move {
            // Table slices read state written earlier in the call, so they are never memoized.
            if matches!(lookup, Lookup::TableSlice { .. }) {
                return self.compute(lookup, report, scope, &at).await;
            }
            let fingerprint = lookup.fingerprint()?;
            let pure = lookup.is_pure();
            if pure && let Some(hit) = self.pure.get(&fingerprint) {
                return Ok(hit.value().clone());
            }
            let cell = scope.lookup_cell(fingerprint);
            let metas = cell
                .get_or_try_init(|| self.compute(lookup, report, scope, &at))
                .await?
                .clone();
            if pure {
                self.pure.insert(fingerprint, metas.clone());
            }
            Ok(metas)
        }
        .boxed()
    }

    async fn compute(
        &self,
        lookup: &Lookup,
        report: &Record,
        scope: &CallScope,
        at: &str,
    ) -> Result<Vec<AccountMeta>, Error> {
        let metas = match lookup {
            Lookup::Constant {
                address,
                is_signer,
                is_writable,
                ..
            } => vec![AccountMeta::new(*address, *is_signer, *is_writable)],
            Lookup::Field {
                path: field_path,
                is_signer,
                is_writable,
                ..
            } => resolve_field(field_path, is_signer, is_writable, report, at)?,
            Lookup::Derived {
                program,
                seeds,
                internal_field,
                is_signer,
                is_writable,
                ..
            } => {
                let addresses = self
                    .derive(program, seeds, internal_field.as_ref(), report, scope, at)
                    .await?;
                addresses
                    .into_iter()
                    .map(|a| AccountMeta::new(a, *is_signer, *is_writable))
                    .collect()
            }
            Lookup::TableSlice {
                table_name,
                indexes,
                is_signer,
                is_writable,
                ..
            } => slice_table(scope, table_name, indexes.as_deref(), at)?
                .into_iter()
                .map(|a| AccountMeta::new(a, *is_signer, *is_writable))
                .collect(),
            Lookup::DerivedTable { name, accounts, .. } => {
                self.derive_table(name, accounts, report, scope, at).await?
            }
        };
        trace!(lookup = at, count = metas.len(), "resolved");
        Ok(metas)
    }

    async fn derive(
        &self,
        program: &Lookup,
        seeds: &[Seed],
        internal_field: Option<&InternalField>,
        report: &Record,
        scope: &CallScope,
        at: &str,
    ) -> Result<Vec<Address>, Error> {
        if seeds.len() > MAX_SEEDS {
            return Err(Error::codec(format!(
                "[{at}] {} seeds exceed the limit of {MAX_SEEDS}",
                seeds.len()
            )));
        }
        let seed_values = try_join_all(
            seeds
                .iter()
                .map(|seed| self.seed_candidates(seed, report, scope, at)),
        )
        .await?;
        // An absent seed omits the account before the program lookup touches the chain.
        if seed_values.iter().any(Vec::is_empty) {
            debug!(lookup = at, "derivation seed absent");
            return Ok(Vec::new());
        }
        let program_at = format!("{at}.{}", program.name());
        let programs = self.resolve_at(program, report, scope, program_at).await?;
        if programs.is_empty() {
            debug!(lookup = at, "derivation program absent");
            return Ok(Vec::new());
        }

        let mut derived = Vec::new();
        for program in &programs {
            for combination in cartesian(&seed_values) {
                let address = self
                    .client
                    .derive_address(&program.address, &combination)
                    .ok_or_else(|| {
                        Error::resolution(at, format!("no viable address under {}", program.address))
                    })?;
                derived.push(address);
            }
        }

        let Some(field) = internal_field else {
            return Ok(derived);
        };
        let indirect = try_join_all(
            derived
                .iter()
                .map(|address| self.read_internal_field(*address, field, scope, at)),
        )
        .await?;
        Ok(indirect.into_iter().flatten().collect())
    }

    /// Candidate byte strings for one seed; several when the report fans out.
    async fn seed_candidates(
        &self,
        seed: &Seed,
        report: &Record,
        scope: &CallScope,
        at: &str,
    ) -> Result<Vec<Vec<u8>>, Error> {
        match seed {
            Seed::Static(bytes) => Ok(vec![bytes.clone()]),
            Seed::Dynamic(Lookup::Field {
                path: field_path,
                value_type,
                ..
            }) => {
                let values = if value_type.is_byte_like() {
                    path::get_all(report, field_path)
                } else {
                    path::get_all_flat(report, field_path)
                };
                let idl = self.schemas.idl(scope.namespace()).ok();
                values
                    .into_iter()
                    .map(|value| {
                        codec::encode_seed(value, value_type, idl)
                            .map_err(|e| e.at_lookup(&format!("{at}.{field_path}")))
                    })
                    .collect()
            }
            Seed::Dynamic(lookup) => {
                let seed_at = format!("{at}.{}", lookup.name());
                let metas = self.resolve_at(lookup, report, scope, seed_at).await?;
                Ok(metas
                    .into_iter()
                    .map(|meta| meta.address.to_bytes().to_vec())
                    .collect())
            }
        }
    }

    async fn read_internal_field(
        &self,
        address: Address,
        field: &InternalField,
        scope: &CallScope,
        at: &str,
    ) -> Result<Vec<Address>, Error> {
        let snapshot = scope
            .account(self.client.as_ref(), address)
            .await
            .map_err(|e| e.at_lookup(at))?;
        let Some(data) = snapshot else {
            debug!(lookup = at, %address, "indirection account does not exist");
            return Ok(Vec::new());
        };
        let record = self
            .schemas
            .decode_account(scope.namespace(), &field.type_name, &data)
            .map_err(|e| e.at_lookup(at))?;
        path::get_all_flat(&record, &field.location)
            .into_iter()
            .map(|value| codec::value_to_address(value).map_err(|e| e.at_lookup(at)))
            .collect()
    }

    async fn derive_table(
        &self,
        name: &str,
        accounts: &Lookup,
        report: &Record,
        scope: &CallScope,
        at: &str,
    ) -> Result<Vec<AccountMeta>, Error> {
        let accounts_at = format!("{at}.{}", accounts.name());
        let tables = self.resolve_at(accounts, report, scope, accounts_at).await?;
        if tables.is_empty() {
            return Ok(Vec::new());
        }
        let contents = try_join_all(tables.iter().map(|meta| async move {
            let snapshot = scope
                .account(self.client.as_ref(), meta.address)
                .await
                .map_err(|e| e.at_lookup(at))?;
            let data = snapshot.ok_or_else(|| {
                Error::resolution(at, format!("lookup table {} does not exist", meta.address))
            })?;
            let entries = codec::decode_lookup_table(&data).map_err(|e| e.at_lookup(at))?;
            Ok::<_, Error>((meta.address, entries))
        }))
        .await?;
        debug!(lookup = at, tables = contents.len(), "derived lookup table");
        let metas = contents
            .iter()
            .flat_map(|(_, entries)| entries.iter().copied().map(AccountMeta::readonly))
            .collect();
        scope.put_table(name, contents);
        Ok(metas)
    }
}

fn resolve_field(
    field_path: &str,
    is_signer: &MetaFlag,
    is_writable: &MetaFlag,
    report: &Record,
    at: &str,
) -> Result<Vec<AccountMeta>, Error> {
    let addresses = path::get_all_flat(report, field_path)
        .into_iter()
        .map(|value| codec::value_to_address(value).map_err(|e| e.at_lookup(at)))
        .collect::<Result<Vec<_>, _>>()?;
    let signer_bits = flag_bits(is_signer, report, at)?;
    let writable_bits = flag_bits(is_writable, report, at)?;
    Ok(addresses
        .into_iter()
        .enumerate()
        .map(|(i, address)| AccountMeta::new(address, signer_bits(i), writable_bits(i)))
        .collect())
}

/// Per-index flag reader. A bitmap absent from the report reads as all zeroes.
fn flag_bits(flag: &MetaFlag, report: &Record, at: &str) -> Result<impl Fn(usize) -> bool, Error> {
    let (fixed, bitmap) = match flag {
        MetaFlag::Value(value) => (*value, 0u64),
        MetaFlag::Bitmap { bitmap_path } => {
            let bitmap = match path::get_first(report, bitmap_path) {
                None => 0,
                Some(value) => {
                    let raw = codec::value_to_u128(value).map_err(|e| e.at_lookup(at))?;
                    u64::try_from(raw).map_err(|_| {
                        Error::codec(format!("[{at}] bitmap {raw} does not fit in u64"))
                    })?
                }
            };
            (false, bitmap)
        }
    };
    Ok(move |i: usize| fixed || (i < 64 && bitmap & (1u64 << i) != 0))
}

fn slice_table(
    scope: &CallScope,
    table_name: &str,
    indexes: Option<&[usize]>,
    at: &str,
) -> Result<Vec<Address>, Error> {
    let Some(contents) = scope.table(table_name) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for (table, entries) in &contents {
        match indexes {
            None | Some([]) => out.extend(entries.iter().copied()),
            Some(indexes) => {
                for index in indexes {
                    let entry = entries.get(*index).ok_or_else(|| {
                        Error::resolution(
                            at,
                            format!(
                                "index {index} out of range for table {table} ({} entries)",
                                entries.len()
                            ),
                        )
                    })?;
                    out.push(*entry);
                }
            }
        }
    }
    Ok(out)
}

fn cartesian(candidates: &[Vec<Vec<u8>>]) -> Vec<Vec<&[u8]>> {
    candidates.iter().fold(vec![Vec::new()], |acc, options| {
        acc.iter()
            .flat_map(|prefix| {
                options.iter().map(move |option| {
                    let mut next = prefix.clone();
                    next.push(option.as_slice());
                    next
                })
            })
            .collect()
    })
}
