#![expect(
    clippy::unwrap_used,
    clippy::panic,
    reason = "test code uses unwrap/panic for concise assertions"
)]

use ccip_solana_resolver::config::ccip::{
    dest_reader_config, names, offramp_writer_config, source_reader_config,
};
use ccip_solana_resolver::config::{ArgsTransform, BufferMethod};
use ccip_solana_resolver::{Address, Error, ReaderConfig, WriterConfig, merge_reader_configs};
use serde_json::Value;

fn writer_config() -> WriterConfig {
    offramp_writer_config(
        Address::new_unique(),
        Address::new_unique(),
        Address::new_unique(),
    )
    .unwrap()
}

fn assert_config_error<T: std::fmt::Debug>(result: Result<T, Error>, needle: &str) {
    match result {
        Err(Error::Config { reason }) => assert!(
            reason.contains(needle),
            "expected config error mentioning {needle:?}, got {reason:?}"
        ),
        other => panic!("expected config error mentioning {needle:?}, got {other:?}"),
    }
}

// ──────────────────── Round trips ────────────────────

#[test]
fn reader_configs_survive_json() {
    for config in [dest_reader_config().unwrap(), source_reader_config().unwrap()] {
        let json = config.to_json().unwrap();
        let loaded = ReaderConfig::from_json(&json).unwrap();
        assert_eq!(loaded, config);
    }
}

#[test]
fn writer_config_survives_json() {
    let config = writer_config();
    let json = config.to_json().unwrap();
    let loaded = WriterConfig::from_json(&json).unwrap();
    assert_eq!(loaded, config);

    let doc: Value = serde_json::from_str(&json).unwrap();
    let execute = &doc["programs"][names::OFF_RAMP]["methods"][names::METHOD_EXECUTE];
    assert_eq!(execute["args_transform"]["kind"], "ccip_token_indexes");
    assert_eq!(execute["lookup_tables"]["static"].as_array().unwrap().len(), 1);
    assert_eq!(execute["accounts"][0]["kind"], "derived");
}

#[test]
fn omitted_defaults_are_filled_in() {
    let mut doc: Value = serde_json::from_str(&writer_config().to_json().unwrap()).unwrap();
    let root = doc.as_object_mut().unwrap();
    root.remove("version");
    root.remove("max_instruction_data_len");
    let loaded = WriterConfig::from_json(&doc.to_string()).unwrap();
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.max_instruction_data_len, 1232);
}

// ──────────────────── Rejections ────────────────────

#[test]
fn unsupported_version_is_rejected() {
    let mut config = dest_reader_config().unwrap();
    config.version = 2;
    assert_config_error(config.validate(), "version");
}

#[test]
fn malformed_document_is_a_config_error() {
    assert_config_error(ReaderConfig::from_json("{\"namespaces\": 3}"), "invalid reader");
    assert_config_error(WriterConfig::from_json("[]"), "invalid writer");
}

#[test]
fn share_group_members_must_exist_once() {
    let mut config = dest_reader_config().unwrap();
    config
        .address_share_groups
        .push(vec!["Nowhere".to_string()]);
    assert_config_error(config.validate(), "Nowhere");

    let mut config = dest_reader_config().unwrap();
    config
        .address_share_groups
        .push(vec![names::ROUTER.to_string(), names::OFF_RAMP.to_string()]);
    assert_config_error(config.validate(), "more than one share group");
}

#[test]
fn reads_must_name_schema_types() {
    let mut config = dest_reader_config().unwrap();
    let read = config
        .namespaces
        .get_mut(names::OFF_RAMP)
        .unwrap()
        .reads
        .get_mut(names::OFF_RAMP_LATEST_CONFIG_DETAILS)
        .unwrap();
    read.chain_specific_name = "Missing".to_string();
    assert_config_error(config.validate(), "Missing");
}

#[test]
fn event_reads_cap_indexed_fields() {
    let mut config = dest_reader_config().unwrap();
    let read = config
        .namespaces
        .get_mut(names::OFF_RAMP)
        .unwrap()
        .reads
        .get_mut(names::EXECUTION_STATE_CHANGED)
        .unwrap();
    let event = read.event_definition.as_mut().unwrap();
    let extra = event.indexed_fields[0].clone();
    event.indexed_fields.push(extra);
    assert_config_error(config.validate(), "indexed fields");
}

#[test]
fn zero_program_address_is_rejected() {
    let mut config = writer_config();
    config.programs.get_mut(names::OFF_RAMP).unwrap().address = Address::default();
    assert_config_error(config.validate(), "zero address");
}

#[test]
fn token_index_transform_needs_a_declared_table() {
    let mut config = writer_config();
    let execute = config
        .programs
        .get_mut(names::OFF_RAMP)
        .unwrap()
        .methods
        .get_mut(names::METHOD_EXECUTE)
        .unwrap();
    execute.args_transform = Some(ArgsTransform::CcipTokenIndexes {
        table: "Elsewhere".to_string(),
    });
    assert_config_error(config.validate(), "Elsewhere");
}

#[test]
fn sliced_tables_must_be_derived() {
    let mut config = writer_config();
    let execute = config
        .programs
        .get_mut(names::OFF_RAMP)
        .unwrap()
        .methods
        .get_mut(names::METHOD_EXECUTE)
        .unwrap();
    execute.lookup_tables.derived.clear();
    execute.args_transform = None;
    assert_config_error(config.validate(), "never derived");
}

#[test]
fn buffer_method_is_checked_against_the_schema() {
    let mut config = writer_config();
    let commit = config
        .programs
        .get_mut(names::OFF_RAMP)
        .unwrap()
        .methods
        .get_mut(names::METHOD_COMMIT)
        .unwrap();
    commit.buffer_method = Some(BufferMethod {
        chain_specific_name: "buffer_execution_report".to_string(),
        chunk_size: 800,
        seed_prefix: b"commit_report_buffer".to_vec(),
        buffered_arg: "RawExecutionReport".to_string(),
    });
    assert_config_error(config.validate(), "RawExecutionReport");

    let mut config = writer_config();
    let execute = config
        .programs
        .get_mut(names::OFF_RAMP)
        .unwrap()
        .methods
        .get_mut(names::METHOD_EXECUTE)
        .unwrap();
    execute.buffer_method.as_mut().unwrap().chunk_size = 5000;
    assert_config_error(config.validate(), "chunk size");
}

// ──────────────────── Merging ────────────────────

#[test]
fn merged_configs_keep_every_namespace() {
    let dest = dest_reader_config().unwrap();
    let source = source_reader_config().unwrap();
    let merged = merge_reader_configs(&[dest.clone(), source.clone()]);
    merged.validate().unwrap();

    for name in dest.namespaces.keys().chain(source.namespaces.keys()) {
        assert!(merged.namespaces.contains_key(name), "{name} lost in merge");
    }
    // Source's FeeQuoter replaces dest's, which also served GetDestChainConfig with state.
    assert_eq!(
        merged.namespaces[names::FEE_QUOTER],
        source.namespaces[names::FEE_QUOTER]
    );

    let group = merged.share_group(names::ON_RAMP);
    for member in [names::ROUTER, names::NONCE_MANAGER, names::ON_RAMP] {
        assert!(group.iter().any(|m| m == member), "{member} missing from {group:?}");
    }
    assert_eq!(
        merged.share_group(names::RMN_PROXY).len(),
        2,
        "unrelated groups stay separate"
    );
}
