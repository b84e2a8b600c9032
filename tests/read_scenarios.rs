#![expect(
    clippy::unwrap_used,
    clippy::panic,
    reason = "test code uses unwrap/panic for concise assertions"
)]

use std::sync::Arc;

use ccip_solana_resolver::config::ccip::{
    cctp_token_pool_idl, dest_reader_config, fee_quoter_idl, names, offramp_idl,
    rmn_remote_idl, router_idl, source_reader_config,
};
use ccip_solana_resolver::{
    Address, CallOptions, Error, Idl, IdlType, InMemoryChainClient, RawEvent, ReadExecutor,
    ReadRequest, Record, codec, path,
};
use serde::Deserialize;
use serde_json::{Value, json};

fn load_fixture<T: serde::de::DeserializeOwned>(filename: &str) -> T {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let path = format!("{manifest_dir}/tests/fixtures/{filename}");
    let data =
        std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read {path}: {e}"));
    serde_json::from_str(&data).unwrap_or_else(|e| panic!("failed to parse {path}: {e}"))
}

fn account_data(idl: &Idl, name: &str, fields: &Value) -> Vec<u8> {
    let mut data = codec::account_discriminator(name).to_vec();
    data.extend(
        codec::encode(fields, &IdlType::Defined(name.to_string()), Some(idl))
            .unwrap_or_else(|e| panic!("failed to encode {name}: {e}")),
    );
    data
}

fn pda(program: &Address, seeds: &[&[u8]]) -> Address {
    Address::find_program_address(seeds, program).0
}

fn executor(client: InMemoryChainClient) -> (ReadExecutor, Arc<InMemoryChainClient>) {
    let client = client.into_shared();
    let executor = ReadExecutor::new(dest_reader_config().unwrap(), client.clone()).unwrap();
    (executor, client)
}

async fn read(executor: &ReadExecutor, namespace: &str, operation: &str, params: Value) -> Record {
    executor
        .execute_read(namespace, operation, &params, &CallOptions::default())
        .await
        .unwrap_or_else(|e| panic!("{namespace}.{operation} failed: {e}"))
}

// ──────────────────── CCTP events ────────────────────

#[derive(Debug, Deserialize)]
struct CctpFixture {
    chain: String,
    slot: u64,
    log_index: u32,
    signature: String,
    age_secs: i64,
    reverted: bool,
    event: Value,
}

/// Avalanche and Polygon events land under two different pool programs.
fn cctp_events(avalanche: Address, polygon: Address) -> Vec<RawEvent> {
    let idl = cctp_token_pool_idl().unwrap();
    let now = chrono::Utc::now().timestamp();
    let fixtures: Vec<CctpFixture> = load_fixture("cctp_message_sent_events.json");
    fixtures
        .into_iter()
        .map(|f| {
            let mut data = codec::event_discriminator("CcipCctpMessageSentEvent").to_vec();
            data.extend(
                codec::encode(
                    &f.event,
                    &IdlType::Defined("CcipCctpMessageSentEvent".to_string()),
                    Some(&idl),
                )
                .unwrap(),
            );
            RawEvent {
                program_id: match f.chain.as_str() {
                    "avalanche" => avalanche,
                    "polygon" => polygon,
                    other => panic!("unexpected chain {other}"),
                },
                slot: f.slot,
                block_time: now - f.age_secs,
                signature: f.signature,
                log_index: f.log_index,
                reverted: f.reverted,
                data,
            }
        })
        .collect()
}

async fn cctp_matches(executor: &ReadExecutor, domain: u32, nonce: u64) -> Vec<Value> {
    let result = read(
        executor,
        names::USDC_TOKEN_POOL,
        names::CCTP_MESSAGE_SENT,
        json!({"CCTPNonce": nonce, "SourceDomain": domain}),
    )
    .await;
    result.as_array().cloned().unwrap()
}

#[tokio::test]
async fn cctp_message_sent_filters_by_nonce_and_domain() {
    let avalanche = Address::new_unique();
    let polygon = Address::new_unique();
    let (executor, _) =
        executor(InMemoryChainClient::new().with_events(cctp_events(avalanche, polygon)));
    executor.bind(names::USDC_TOKEN_POOL, avalanche).unwrap();

    let hits = cctp_matches(&executor, 11, 11).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["CctpNonce"], json!(11));
    assert_eq!(hits[0]["SourceDomain"], json!(11));

    // Domain 11 never sent nonce 1234, and domain 12910 never sent nonce 11.
    assert!(cctp_matches(&executor, 11, 1234).await.is_empty());
    assert!(cctp_matches(&executor, 12910, 11).await.is_empty());
    // Polygon's nonce 11 was sent from domain 12, but under another program.
    assert!(cctp_matches(&executor, 12, 11).await.is_empty());
}

#[tokio::test]
async fn cctp_message_sent_skips_reverted_and_expired_events() {
    let avalanche = Address::new_unique();
    let polygon = Address::new_unique();
    let (executor, _) =
        executor(InMemoryChainClient::new().with_events(cctp_events(avalanche, polygon)));
    executor.bind(names::USDC_TOKEN_POOL, avalanche).unwrap();

    let reverted_twin = cctp_matches(&executor, 21, 21).await;
    assert_eq!(reverted_twin.len(), 1);
    let expired_twin = cctp_matches(&executor, 31, 31).await;
    assert_eq!(expired_twin.len(), 1);

    let all = read(
        &executor,
        names::USDC_TOKEN_POOL,
        names::CCTP_MESSAGE_SENT,
        json!({}),
    )
    .await;
    let nonces: Vec<u64> = all
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["CctpNonce"].as_u64().unwrap())
        .collect();
    assert_eq!(nonces, vec![11, 21, 31, 41, 51]);
}

// ──────────────────── OffRamp ────────────────────

fn offramp_fixture(
    offramp: Address,
    selector: u64,
) -> (InMemoryChainClient, Address, Address) {
    let idl = offramp_idl().unwrap();
    let router = Address::new_unique();
    let fee_quoter = Address::new_unique();
    let source_chain = pda(&offramp, &[b"source_chain_state", &selector.to_le_bytes()]);
    let client = InMemoryChainClient::new()
        .with_account(
            pda(&offramp, &[b"reference_addresses"]),
            account_data(
                &idl,
                "ReferenceAddresses",
                &json!({
                    "version": 2,
                    "router": router.to_string(),
                    "fee_quoter": fee_quoter.to_string(),
                    "offramp_lookup_table": Address::new_unique().to_string(),
                    "rmn_remote": Address::new_unique().to_string(),
                }),
            ),
        )
        .with_account(
            pda(&offramp, &[b"config"]),
            account_data(
                &idl,
                "Config",
                &json!({
                    "version": 1,
                    "default_code_version": "V1",
                    "svm_chain_selector": 124_615_329_519_749_607_u64,
                    "enable_manual_execution_after": 3600,
                    "ocr3": [
                        {"plugin_type": 0, "config_digest": vec![7u8; 32], "f": 1, "n": 4,
                         "is_signature_verification_enabled": 1},
                        {"plugin_type": 1, "config_digest": vec![9u8; 32], "f": 1, "n": 4,
                         "is_signature_verification_enabled": 0},
                    ],
                }),
            ),
        )
        .with_account(
            source_chain,
            account_data(
                &idl,
                "SourceChain",
                &json!({
                    "version": 1,
                    "chain_selector": selector,
                    "state": {"min_seq_nr": 42},
                    "config": {
                        "is_enabled": true,
                        "is_rmn_verification_disabled": false,
                        "lane_code_version": "Default",
                        "on_ramp": {"bytes": vec![0xabu8; 64], "len": 20},
                    },
                }),
            ),
        );
    (client, router, source_chain)
}

#[tokio::test]
async fn source_chain_config_merges_config_state_and_references() {
    let offramp = Address::new_unique();
    let selector = 16_015_286_601_757_825_753_u64;
    let (client, router, source_chain) = offramp_fixture(offramp, selector);
    let (executor, client) = executor(client);
    executor.bind(names::OFF_RAMP, offramp).unwrap();

    let config = read(
        &executor,
        names::OFF_RAMP,
        names::GET_SOURCE_CHAIN_CONFIG,
        json!({"SourceChainSelector": selector}),
    )
    .await;

    assert_eq!(path::get_first(&config, "IsEnabled"), Some(&json!(true)));
    assert_eq!(
        path::get_first(&config, "IsRMNVerificationDisabled"),
        Some(&json!(true))
    );
    assert_eq!(path::get_first(&config, "MinSeqNr"), Some(&json!(42)));
    assert_eq!(path::get_first(&config, "OnRamp.Len"), Some(&json!(20)));
    assert_eq!(config["Router"], json!(router.to_string()));
    // Config and State come from the same account, fetched once.
    assert_eq!(client.fetch_count(&source_chain), 1);
}

#[tokio::test]
async fn static_config_takes_later_read_on_conflict() {
    let offramp = Address::new_unique();
    let (client, router, _) = offramp_fixture(offramp, 1);
    let (executor, _) = executor(client);
    executor.bind(names::OFF_RAMP, offramp).unwrap();

    let config = read(
        &executor,
        names::OFF_RAMP,
        names::OFF_RAMP_GET_STATIC_CONFIG,
        json!({}),
    )
    .await;
    assert_eq!(config["ChainSelector"], json!(124_615_329_519_749_607_u64));
    assert_eq!(config["NonceManager"], json!(router.to_string()));
    assert_eq!(config["Version"], json!(2));
}

#[tokio::test]
async fn dynamic_config_renames_and_hard_codes() {
    let offramp = Address::new_unique();
    let (client, _, _) = offramp_fixture(offramp, 1);
    let (executor, _) = executor(client);
    executor.bind(names::OFF_RAMP, offramp).unwrap();

    let config = read(
        &executor,
        names::OFF_RAMP,
        names::OFF_RAMP_GET_DYNAMIC_CONFIG,
        json!({}),
    )
    .await;
    assert_eq!(
        config["PermissionLessExecutionThresholdSeconds"],
        json!(3600)
    );
    assert_eq!(config["IsRMNVerificationDisabled"], json!(true));
    assert!(config.get("EnableManualExecutionAfter").is_none());
}

#[tokio::test]
async fn unknown_source_chain_is_a_read_error() {
    let offramp = Address::new_unique();
    let (client, _, _) = offramp_fixture(offramp, 1);
    let (executor, _) = executor(client);
    executor.bind(names::OFF_RAMP, offramp).unwrap();

    let err = executor
        .execute_read(
            names::OFF_RAMP,
            names::GET_SOURCE_CHAIN_CONFIG,
            &json!({"SourceChainSelector": 999}),
            &CallOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Read { .. }), "got {err:?}");
}

// ──────────────────── RMN ────────────────────

#[tokio::test]
async fn arm_address_is_the_bound_rmn_program() {
    let rmn = Address::new_unique();
    let idl = rmn_remote_idl().unwrap();
    let client = InMemoryChainClient::new().with_account(
        pda(&rmn, &[b"config"]),
        account_data(&idl, "Config", &json!({"version": 1, "default_code_version": "V1"})),
    );
    let (executor, _) = executor(client);
    executor.bind(names::RMN_REMOTE, rmn).unwrap();
    assert_eq!(executor.bound_address(names::RMN_PROXY), Some(rmn));

    let arm = read(&executor, names::RMN_PROXY, names::GET_ARM, json!({})).await;
    assert_eq!(arm, json!(rmn.to_string()));

    let versioned = read(
        &executor,
        names::RMN_REMOTE,
        names::GET_VERSIONED_CONFIG,
        json!({}),
    )
    .await;
    assert_eq!(versioned, json!({"DefaultCodeVersion": "V1"}));
}

#[tokio::test]
async fn cursed_subjects_are_wrapped() {
    let rmn = Address::new_unique();
    let idl = rmn_remote_idl().unwrap();
    let client = InMemoryChainClient::new().with_account(
        pda(&rmn, &[b"curses"]),
        account_data(
            &idl,
            "Curses",
            &json!({"version": 1, "cursed_subjects": [
                {"value": vec![1u8; 16]},
                {"value": vec![2u8; 16]},
            ]}),
        ),
    );
    let (executor, _) = executor(client);
    executor.bind(names::RMN_REMOTE, rmn).unwrap();

    let curses = read(
        &executor,
        names::RMN_REMOTE,
        names::GET_CURSED_SUBJECTS,
        json!({}),
    )
    .await;
    assert_eq!(
        curses,
        json!({"CursedSubjects": [
            format!("0x{}", "01".repeat(16)),
            format!("0x{}", "02".repeat(16)),
        ]})
    );
}

// ──────────────────── FeeQuoter ────────────────────

fn billing_config(idl: &Idl, mint: Address, price: u8) -> Vec<u8> {
    account_data(
        idl,
        "BillingTokenConfigWrapper",
        &json!({
            "version": 1,
            "config": {
                "enabled": true,
                "mint": mint.to_string(),
                "usd_per_token": {"value": vec![price; 28], "timestamp": 1_700_000_000},
                "premium_multiplier_wei_per_eth": 0,
            },
        }),
    )
}

#[tokio::test]
async fn token_prices_fan_out_in_request_order() {
    let fee_quoter = Address::new_unique();
    let idl = fee_quoter_idl().unwrap();
    let (a, b) = (Address::new_unique(), Address::new_unique());
    let client = InMemoryChainClient::new()
        .with_account(
            pda(&fee_quoter, &[b"fee_billing_token_config", a.as_ref()]),
            billing_config(&idl, a, 1),
        )
        .with_account(
            pda(&fee_quoter, &[b"fee_billing_token_config", b.as_ref()]),
            billing_config(&idl, b, 2),
        );
    let (executor, _) = executor(client);
    executor.bind(names::FEE_QUOTER, fee_quoter).unwrap();

    let prices = read(
        &executor,
        names::FEE_QUOTER,
        names::FEE_QUOTER_GET_TOKEN_PRICES,
        json!({"Tokens": [b.to_string(), a.to_string()]}),
    )
    .await;
    let values: Vec<&Value> = prices
        .as_array()
        .unwrap()
        .iter()
        .map(|p| &p["Value"])
        .collect();
    assert_eq!(
        values,
        vec![
            &json!(format!("0x{}", "02".repeat(28))),
            &json!(format!("0x{}", "01".repeat(28))),
        ]
    );

    let single = read(
        &executor,
        names::FEE_QUOTER,
        names::FEE_QUOTER_GET_TOKEN_PRICE,
        json!({"Token": a.to_string()}),
    )
    .await;
    assert_eq!(single["Timestamp"], json!(1_700_000_000));
}

// ──────────────────── Router / NonceManager ────────────────────

#[tokio::test]
async fn inbound_nonce_renames_its_seeds() {
    let router = Address::new_unique();
    let sender = Address::new_unique();
    let selector = 16_015_286_601_757_825_753_u64;
    let idl = router_idl().unwrap();
    let client = InMemoryChainClient::new().with_account(
        pda(&router, &[b"nonce", &selector.to_le_bytes(), sender.as_ref()]),
        account_data(
            &idl,
            "Nonce",
            &json!({"version": 1, "counter": 17, "total_nonce": 30}),
        ),
    );
    let (executor, _) = executor(client);
    executor.bind(names::NONCE_MANAGER, router).unwrap();
    assert_eq!(executor.bound_address(names::ROUTER), Some(router));

    let nonce = read(
        &executor,
        names::NONCE_MANAGER,
        names::GET_INBOUND_NONCE,
        json!({"SourceChainSelector": selector, "Sender": sender.to_string()}),
    )
    .await;
    assert_eq!(nonce["Counter"], json!(17));
}

#[tokio::test]
async fn wrapped_native_needs_no_chain_field() {
    let router = Address::new_unique();
    let idl = router_idl().unwrap();
    let client = InMemoryChainClient::new().with_account(
        pda(&router, &[b"config"]),
        account_data(
            &idl,
            "Config",
            &json!({
                "version": 1,
                "default_code_version": "Default",
                "svm_chain_selector": 1,
                "owner": Address::new_unique().to_string(),
                "proposed_owner": Address::new_unique().to_string(),
                "fee_quoter": Address::new_unique().to_string(),
                "rmn_remote": Address::new_unique().to_string(),
                "link_token_mint": Address::new_unique().to_string(),
                "fee_aggregator": Address::new_unique().to_string(),
            }),
        ),
    );
    let (executor, _) = executor(client);
    executor.bind(names::ROUTER, router).unwrap();

    let native = read(&executor, names::ROUTER, names::GET_WRAPPED_NATIVE, json!({})).await;
    assert_eq!(
        native,
        json!("So11111111111111111111111111111111111111112")
    );
}

// ──────────────────── Batches and binding ────────────────────

#[tokio::test]
async fn batch_read_isolates_failures() {
    let rmn = Address::new_unique();
    let idl = rmn_remote_idl().unwrap();
    let client = InMemoryChainClient::new().with_account(
        pda(&rmn, &[b"config"]),
        account_data(&idl, "Config", &json!({"version": 3, "default_code_version": "V1"})),
    );
    let (executor, _) = executor(client);
    executor.bind(names::RMN_REMOTE, rmn).unwrap();

    let results = executor
        .batch_read(
            &[
                ReadRequest::new(names::RMN_REMOTE, names::GET_REPORT_DIGEST_HEADER, json!({})),
                ReadRequest::new(names::RMN_REMOTE, names::GET_CURSED_SUBJECTS, json!({})),
                ReadRequest::new(names::OFF_RAMP, names::OFF_RAMP_LATEST_CONFIG_DETAILS, json!({})),
            ],
            &CallOptions::default(),
        )
        .await;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap()["Version"], json!(3));
    assert!(matches!(results[1], Err(Error::Read { .. })));
    // OffRamp was never bound.
    assert!(matches!(results[2], Err(Error::Read { .. })));
}

#[test]
fn source_config_shares_router_with_onramp() {
    let client = InMemoryChainClient::new().into_shared();
    let executor = ReadExecutor::new(source_reader_config().unwrap(), client).unwrap();
    let router = Address::new_unique();
    executor.bind(names::ROUTER, router).unwrap();
    assert_eq!(executor.bound_address(names::ON_RAMP), Some(router));
    assert!(matches!(
        executor.bind(names::ON_RAMP, Address::new_unique()),
        Err(Error::Config { .. })
    ));
}
