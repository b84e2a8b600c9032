//! Built-in CCIP reader and writer configurations.
//!
//! Each read and each account list is a small pure constructor so the assembled config
//! can be inspected, serialized and merged like any loaded document.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::json;

use super::{
    ArgsTransform, AtaLookup, BufferMethod, CONFIG_VERSION, DEFAULT_MAX_INSTRUCTION_DATA_LEN,
    DerivedLookupTable, EventDefinition, IndexedField, LookupTables, MethodConfig,
    NamespaceConfig, PdaDefinition, ProgramConfig, ReadDefinition, ReaderConfig, WriterConfig,
};
use crate::codec::{Idl, IdlField, IdlType, IdlTypeDef, IdlTypeDefTy};
use crate::error::Error;
use crate::lookup::{Lookup, MetaFlag, Seed};
use crate::modifiers::{ElementPosition, Modifier};
use crate::types::{Address, SYSTEM_PROGRAM_ID, SYSVAR_INSTRUCTIONS_ID, WRAPPED_SOL_MINT};

pub mod names {
    pub const OFF_RAMP: &str = "OffRamp";
    pub const ON_RAMP: &str = "OnRamp";
    pub const FEE_QUOTER: &str = "FeeQuoter";
    pub const ROUTER: &str = "Router";
    pub const NONCE_MANAGER: &str = "NonceManager";
    pub const RMN_REMOTE: &str = "RMNRemote";
    pub const RMN_PROXY: &str = "RMNProxy";
    pub const USDC_TOKEN_POOL: &str = "USDCTokenPool";

    pub const OFF_RAMP_LATEST_CONFIG_DETAILS: &str = "OffRampLatestConfigDetails";
    pub const GET_LATEST_PRICE_SEQUENCE_NUMBER: &str = "GetLatestPriceSequenceNumber";
    pub const OFF_RAMP_GET_STATIC_CONFIG: &str = "OffRampGetStaticConfig";
    pub const OFF_RAMP_GET_DYNAMIC_CONFIG: &str = "OffRampGetDynamicConfig";
    pub const GET_SOURCE_CHAIN_CONFIG: &str = "GetSourceChainConfig";
    pub const FEE_QUOTER_GET_STATIC_CONFIG: &str = "FeeQuoterGetStaticConfig";
    pub const FEE_QUOTER_GET_TOKEN_PRICES: &str = "FeeQuoterGetTokenPrices";
    pub const FEE_QUOTER_GET_TOKEN_PRICE: &str = "FeeQuoterGetTokenPrice";
    pub const GET_FEE_PRICE_UPDATE: &str = "GetFeePriceUpdate";
    pub const GET_DEST_CHAIN_CONFIG: &str = "GetDestChainConfig";
    pub const GET_WRAPPED_NATIVE: &str = "GetWrappedNative";
    pub const GET_INBOUND_NONCE: &str = "GetInboundNonce";
    pub const GET_ARM: &str = "GetARM";
    pub const GET_VERSIONED_CONFIG: &str = "GetVersionedConfig";
    pub const GET_REPORT_DIGEST_HEADER: &str = "GetReportDigestHeader";
    pub const GET_CURSED_SUBJECTS: &str = "GetCursedSubjects";
    pub const GET_EXPECTED_NEXT_SEQUENCE_NUMBER: &str = "GetExpectedNextSequenceNumber";
    pub const ON_RAMP_GET_DEST_CHAIN_CONFIG: &str = "OnRampGetDestChainConfig";
    pub const ON_RAMP_GET_DYNAMIC_CONFIG: &str = "OnRampGetDynamicConfig";

    pub const EXECUTION_STATE_CHANGED: &str = "ExecutionStateChanged";
    pub const COMMIT_REPORT_ACCEPTED: &str = "CommitReportAccepted";
    pub const CCIP_MESSAGE_SENT: &str = "CCIPMessageSent";
    pub const CCTP_MESSAGE_SENT: &str = "CCTPMessageSent";

    pub const ATTR_SOURCE_CHAIN: &str = "SourceChain";
    pub const ATTR_DEST_CHAIN: &str = "DestChain";
    pub const ATTR_SEQUENCE_NUMBER: &str = "SequenceNumber";
    pub const ATTR_STATE: &str = "State";
    pub const ATTR_CCTP_NONCE: &str = "CCTPNonce";
    pub const ATTR_SOURCE_DOMAIN: &str = "SourceDomain";

    pub const METHOD_EXECUTE: &str = "Execute";
    pub const METHOD_COMMIT: &str = "Commit";
    pub const POOL_LOOKUP_TABLE: &str = "PoolLookupTable";
}

pub const SOURCE_CHAIN_SELECTOR_PATH: &str = "Info.AbstractReports.SourceChainSelector";
pub const DEST_TOKEN_ADDRESS_PATH: &str =
    "Info.AbstractReports.Messages.TokenAmounts.DestTokenAddress";
pub const RECEIVER_PATH: &str = "Info.AbstractReports.Messages.Receiver";
pub const MERKLE_ROOT_PATH: &str = "Info.MerkleRoots.MerkleRoot";
pub const MERKLE_ROOT_CHAIN_SELECTOR_PATH: &str = "Info.MerkleRoots.ChainSel";
pub const TOKEN_PRICE_TOKEN_PATH: &str = "Info.TokenPrices.TokenID";
pub const GAS_PRICE_CHAIN_SELECTOR_PATH: &str = "Info.GasPrices.ChainSel";
pub const USER_ACCOUNTS_PATH: &str = "Info.AbstractReports.Messages.ExtraArgsDecoded.Accounts";
pub const USER_ACCOUNTS_BITMAP_PATH: &str =
    "Info.AbstractReports.Messages.ExtraArgsDecoded.IsWritableBitmap";
pub const EXECUTE_DEBUG_PATH: &str = "Info.AbstractReports.Messages.Header.MessageID";

/// Index of the token program inside a token pool lookup table.
pub const POOL_TABLE_TOKEN_PROGRAM_INDEX: usize = 6;
pub const EXECUTE_COMPUTE_UNIT_OVERHEAD: u32 = 150_000;
pub const EXECUTION_REPORT_BUFFER_CHUNK: usize = 800;

const EVENT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const OFFRAMP_IDL: &str = include_str!("../../idl/ccip_offramp.json");
const FEE_QUOTER_IDL: &str = include_str!("../../idl/fee_quoter.json");
const ROUTER_IDL: &str = include_str!("../../idl/ccip_router.json");
const RMN_REMOTE_IDL: &str = include_str!("../../idl/rmn_remote.json");
const CCTP_TOKEN_POOL_IDL: &str = include_str!("../../idl/cctp_token_pool.json");

pub fn offramp_idl() -> Result<Idl, Error> {
    Idl::from_json(OFFRAMP_IDL)
}

/// Fee quoter schema with the `USDPerToken` account appended.
pub fn fee_quoter_idl() -> Result<Idl, Error> {
    let usd_per_token = IdlTypeDef {
        name: "USDPerToken".to_string(),
        ty: IdlTypeDefTy::Struct {
            fields: vec![IdlField::new(
                "tokenPrices",
                IdlType::Vec(Box::new(IdlType::Defined("TimestampedPackedU224".into()))),
            )],
        },
    };
    let idl = Idl::from_json(FEE_QUOTER_IDL)?.with_account(usd_per_token);
    idl.validate()?;
    Ok(idl)
}

pub fn router_idl() -> Result<Idl, Error> {
    Idl::from_json(ROUTER_IDL)
}

pub fn rmn_remote_idl() -> Result<Idl, Error> {
    Idl::from_json(RMN_REMOTE_IDL)
}

pub fn cctp_token_pool_idl() -> Result<Idl, Error> {
    Idl::from_json(CCTP_TOKEN_POOL_IDL)
}

fn pda(prefix: &str) -> PdaDefinition {
    PdaDefinition::new(prefix.as_bytes())
}

fn namespace(idl: Idl, reads: Vec<(&str, ReadDefinition)>) -> NamespaceConfig {
    NamespaceConfig {
        idl,
        reads: reads
            .into_iter()
            .map(|(name, read)| (name.to_string(), read))
            .collect(),
    }
}

fn indexed(pairs: &[(&str, &str)]) -> Vec<IndexedField> {
    pairs
        .iter()
        .map(|(off_chain, on_chain)| IndexedField {
            off_chain_name: (*off_chain).to_string(),
            on_chain_path: (*on_chain).to_string(),
        })
        .collect()
}

fn event(chain_name: &str, include_reverted: bool, fields: &[(&str, &str)]) -> ReadDefinition {
    ReadDefinition::event(
        chain_name,
        EventDefinition {
            retention: EVENT_RETENTION,
            include_reverted,
            indexed_fields: indexed(fields),
        },
    )
}

fn reference_addresses(output: Vec<Modifier>) -> ReadDefinition {
    ReadDefinition::account("ReferenceAddresses", pda("reference_addresses")).output(output)
}

fn execution_state_changed() -> ReadDefinition {
    event(
        "ExecutionStateChanged",
        true,
        &[
            (names::ATTR_SOURCE_CHAIN, "SourceChainSelector"),
            (names::ATTR_SEQUENCE_NUMBER, "SequenceNumber"),
            (names::ATTR_STATE, "State"),
        ],
    )
}

fn commit_report_accepted() -> ReadDefinition {
    event("CommitReportAccepted", false, &[]).output(vec![
        Modifier::rename(&[("MerkleRoot", "UnblessedMerkleRoots")]),
        Modifier::element_extract("UnblessedMerkleRoots", ElementPosition::First),
    ])
}

fn offramp_static_config() -> ReadDefinition {
    ReadDefinition::account("Config", pda("config"))
        .output(vec![Modifier::rename(&[("SvmChainSelector", "ChainSelector")])])
        .with_multi_reader(
            false,
            vec![reference_addresses(vec![Modifier::rename(&[(
                "Router",
                "NonceManager",
            )])])],
        )
}

fn offramp_dynamic_config() -> ReadDefinition {
    ReadDefinition::account("Config", pda("config"))
        .output(vec![
            Modifier::rename(&[(
                "EnableManualExecutionAfter",
                "PermissionLessExecutionThresholdSeconds",
            )]),
            Modifier::hard_code_off_chain(&[("IsRMNVerificationDisabled", json!(true))]),
        ])
        .with_multi_reader(false, vec![reference_addresses(Vec::new())])
}

fn source_chain_config() -> ReadDefinition {
    ReadDefinition::account(
        "SourceChain",
        pda("source_chain_state").seed("NewChainSelector", IdlType::U64),
    )
    .input(vec![Modifier::rename(&[(
        "NewChainSelector",
        "SourceChainSelector",
    )])])
    .output(vec![
        Modifier::property_extract("Config"),
        Modifier::hard_code_off_chain(&[("IsRMNVerificationDisabled", json!(true))]),
    ])
    .with_multi_reader(
        true,
        vec![
            reference_addresses(Vec::new()),
            ReadDefinition::account(
                "SourceChain",
                pda("source_chain_state").seed("NewChainSelector", IdlType::U64),
            )
            .input(vec![Modifier::rename(&[(
                "NewChainSelector",
                "SourceChainSelector",
            )])])
            .output(vec![Modifier::property_extract("State")]),
        ],
    )
}

fn offramp_reads() -> Vec<(&'static str, ReadDefinition)> {
    vec![
        (names::EXECUTION_STATE_CHANGED, execution_state_changed()),
        (names::COMMIT_REPORT_ACCEPTED, commit_report_accepted()),
        (
            names::OFF_RAMP_LATEST_CONFIG_DETAILS,
            ReadDefinition::account("Config", pda("config")),
        ),
        (
            names::GET_LATEST_PRICE_SEQUENCE_NUMBER,
            ReadDefinition::account("GlobalState", pda("state"))
                .output(vec![Modifier::property_extract("LatestPriceSequenceNumber")]),
        ),
        (names::OFF_RAMP_GET_STATIC_CONFIG, offramp_static_config()),
        (names::OFF_RAMP_GET_DYNAMIC_CONFIG, offramp_dynamic_config()),
        (names::GET_SOURCE_CHAIN_CONFIG, source_chain_config()),
    ]
}

fn fee_quoter_dest_chain() -> ReadDefinition {
    ReadDefinition::account(
        "DestChain",
        pda("dest_chain").seed("DestinationChainSelector", IdlType::U64),
    )
    .input(vec![Modifier::rename(&[(
        "DestinationChainSelector",
        "DestChainSelector",
    )])])
}

fn fee_quoter_reads(with_dest_state: bool) -> Vec<(&'static str, ReadDefinition)> {
    let mut dest_chain_config = fee_quoter_dest_chain().output(vec![
        Modifier::property_extract("Config"),
        Modifier::rename(&[
            ("DefaultTokenFeeUsdcents", "DefaultTokenFeeUSDCents"),
            ("NetworkFeeUsdcents", "NetworkFeeUSDCents"),
        ]),
    ]);
    if with_dest_state {
        dest_chain_config = dest_chain_config.with_multi_reader(
            true,
            vec![fee_quoter_dest_chain().output(vec![Modifier::property_extract("State")])],
        );
    }
    vec![
        (
            names::FEE_QUOTER_GET_STATIC_CONFIG,
            ReadDefinition::account("Config", pda("config")).output(vec![Modifier::rename(&[
                ("MaxFeeJuelsPerMsg", "MaxFeeJuelsPerMsg"),
                ("LinkTokenMint", "LinkToken"),
            ])]),
        ),
        (
            names::FEE_QUOTER_GET_TOKEN_PRICES,
            ReadDefinition::account(
                "BillingTokenConfigWrapper",
                pda("fee_billing_token_config")
                    .seed("Tokens", IdlType::Vec(Box::new(IdlType::Pubkey))),
            )
            .output(vec![Modifier::property_extract("Config.UsdPerToken")]),
        ),
        (
            names::FEE_QUOTER_GET_TOKEN_PRICE,
            ReadDefinition::account(
                "BillingTokenConfigWrapper",
                pda("fee_billing_token_config").seed("Token", IdlType::Pubkey),
            )
            .output(vec![Modifier::property_extract("Config.UsdPerToken")]),
        ),
        (
            names::GET_FEE_PRICE_UPDATE,
            fee_quoter_dest_chain()
                .output(vec![Modifier::property_extract("State.UsdPerUnitGas")]),
        ),
        (names::GET_DEST_CHAIN_CONFIG, dest_chain_config),
    ]
}

fn wrapped_native() -> ReadDefinition {
    ReadDefinition::account("Config", pda("config")).output(vec![
        Modifier::hard_code_off_chain(&[("WrappedNative", json!(WRAPPED_SOL_MINT.to_string()))]),
        Modifier::property_extract("WrappedNative"),
    ])
}

fn inbound_nonce() -> ReadDefinition {
    ReadDefinition::account(
        "Nonce",
        pda("nonce")
            .seed("DestinationChainSelector", IdlType::U64)
            .seed("Authority", IdlType::Pubkey),
    )
    .input(vec![Modifier::rename(&[
        ("DestinationChainSelector", "SourceChainSelector"),
        ("Authority", "Sender"),
    ])])
}

fn rmn_remote_reads() -> Vec<(&'static str, ReadDefinition)> {
    vec![
        (
            names::GET_VERSIONED_CONFIG,
            ReadDefinition::account("Config", pda("config"))
                .output(vec![Modifier::drop_fields(&["Version"])]),
        ),
        (
            names::GET_REPORT_DIGEST_HEADER,
            ReadDefinition::account("Config", pda("config")),
        ),
        (
            names::GET_CURSED_SUBJECTS,
            ReadDefinition::account("Curses", pda("curses")).output(vec![
                Modifier::property_extract("CursedSubjects.Value"),
                Modifier::wrap("", "CursedSubjects"),
            ]),
        ),
    ]
}

fn rmn_proxy_reads() -> Vec<(&'static str, ReadDefinition)> {
    vec![(
        names::GET_ARM,
        ReadDefinition::account("Config", pda("config")).output(vec![
            Modifier::hard_code_off_chain(&[("RmnRemoteAddress", json!(""))]),
            Modifier::property_extract("RmnRemoteAddress"),
            Modifier::response_address(""),
        ]),
    )]
}

fn cctp_message_sent() -> Vec<(&'static str, ReadDefinition)> {
    vec![(
        names::CCTP_MESSAGE_SENT,
        event(
            "CcipCctpMessageSentEvent",
            false,
            &[
                (names::ATTR_CCTP_NONCE, "CctpNonce"),
                (names::ATTR_SOURCE_DOMAIN, "SourceDomain"),
            ],
        ),
    )]
}

fn onramp_dest_chain() -> ReadDefinition {
    ReadDefinition::account(
        "DestChain",
        pda("dest_chain_state").seed("NewChainSelector", IdlType::U64),
    )
    .input(vec![Modifier::rename(&[(
        "NewChainSelector",
        "DestChainSelector",
    )])])
}

fn onramp_reads() -> Vec<(&'static str, ReadDefinition)> {
    vec![
        (
            names::GET_EXPECTED_NEXT_SEQUENCE_NUMBER,
            onramp_dest_chain().output(vec![
                Modifier::property_extract("State"),
                Modifier::rename(&[("SequenceNumber", "ExpectedNextSequenceNumber")]),
            ]),
        ),
        (
            names::CCIP_MESSAGE_SENT,
            event(
                "CCIPMessageSent",
                false,
                &[
                    (names::ATTR_SOURCE_CHAIN, "Message.Header.SourceChainSelector"),
                    (names::ATTR_DEST_CHAIN, "Message.Header.DestChainSelector"),
                    (names::ATTR_SEQUENCE_NUMBER, "Message.Header.SequenceNumber"),
                ],
            ),
        ),
        (
            names::ON_RAMP_GET_DEST_CHAIN_CONFIG,
            onramp_dest_chain()
                .output(vec![
                    Modifier::property_extract("State"),
                    Modifier::rename(&[("SequenceNumber", "ExpectedNextSequenceNumber")]),
                    Modifier::response_address("Router"),
                ])
                .with_multi_reader(
                    true,
                    vec![onramp_dest_chain().output(vec![Modifier::property_extract("Config")])],
                ),
        ),
        (
            names::ON_RAMP_GET_DYNAMIC_CONFIG,
            ReadDefinition::account("Config", pda("config")).output(vec![
                Modifier::rename(&[("Owner", "AllowListAdmin")]),
                Modifier::wrap("", "DynamicConfig"),
            ]),
        ),
    ]
}

/// Reads served by the destination chain: OffRamp, FeeQuoter, Router, NonceManager, RMN
/// and the USDC token pool.
pub fn dest_reader_config() -> Result<ReaderConfig, Error> {
    let mut namespaces = BTreeMap::new();
    namespaces.insert(
        names::OFF_RAMP.to_string(),
        namespace(offramp_idl()?, offramp_reads()),
    );
    namespaces.insert(
        names::FEE_QUOTER.to_string(),
        namespace(fee_quoter_idl()?, fee_quoter_reads(true)),
    );
    namespaces.insert(
        names::ROUTER.to_string(),
        namespace(router_idl()?, vec![(names::GET_WRAPPED_NATIVE, wrapped_native())]),
    );
    namespaces.insert(
        names::NONCE_MANAGER.to_string(),
        namespace(router_idl()?, vec![(names::GET_INBOUND_NONCE, inbound_nonce())]),
    );
    namespaces.insert(
        names::RMN_REMOTE.to_string(),
        namespace(rmn_remote_idl()?, rmn_remote_reads()),
    );
    namespaces.insert(
        names::RMN_PROXY.to_string(),
        namespace(rmn_remote_idl()?, rmn_proxy_reads()),
    );
    namespaces.insert(
        names::USDC_TOKEN_POOL.to_string(),
        namespace(cctp_token_pool_idl()?, cctp_message_sent()),
    );
    let config = ReaderConfig {
        version: CONFIG_VERSION,
        address_share_groups: vec![
            vec![names::ROUTER.to_string(), names::NONCE_MANAGER.to_string()],
            vec![names::RMN_REMOTE.to_string(), names::RMN_PROXY.to_string()],
        ],
        namespaces,
    };
    config.validate()?;
    Ok(config)
}

/// Reads served by the source chain: OnRamp, FeeQuoter, Router and the USDC token pool.
pub fn source_reader_config() -> Result<ReaderConfig, Error> {
    let mut namespaces = BTreeMap::new();
    namespaces.insert(
        names::ON_RAMP.to_string(),
        namespace(router_idl()?, onramp_reads()),
    );
    namespaces.insert(
        names::FEE_QUOTER.to_string(),
        namespace(fee_quoter_idl()?, fee_quoter_reads(false)),
    );
    namespaces.insert(
        names::ROUTER.to_string(),
        namespace(router_idl()?, vec![(names::GET_WRAPPED_NATIVE, wrapped_native())]),
    );
    namespaces.insert(
        names::USDC_TOKEN_POOL.to_string(),
        namespace(cctp_token_pool_idl()?, cctp_message_sent()),
    );
    let config = ReaderConfig {
        version: CONFIG_VERSION,
        address_share_groups: vec![vec![names::ROUTER.to_string(), names::ON_RAMP.to_string()]],
        namespaces,
    };
    config.validate()?;
    Ok(config)
}

fn offramp_pda(offramp: Address, name: &str, seeds: Vec<Seed>) -> Lookup {
    Lookup::derived(
        name,
        Lookup::constant(names::OFF_RAMP, offramp, false, false),
        seeds,
    )
}

fn reference_addresses_account(offramp: Address) -> Lookup {
    offramp_pda(
        offramp,
        "ReferenceAddresses",
        vec![Seed::literal(b"reference_addresses")],
    )
}

/// A program address read from the OffRamp's reference addresses account.
fn referenced_program(offramp: Address, location: &str) -> Lookup {
    reference_addresses_account(offramp).with_internal_field("ReferenceAddresses", location)
}

fn common_accounts(offramp: Address) -> Vec<Lookup> {
    vec![
        offramp_pda(offramp, "Config", vec![Seed::literal(b"config")]),
        reference_addresses_account(offramp),
    ]
}

fn authority_accounts(from_address: Address) -> Vec<Lookup> {
    vec![
        Lookup::constant("Authority", from_address, true, true),
        Lookup::constant("SystemProgram", SYSTEM_PROGRAM_ID, false, false),
        Lookup::constant("SysvarInstructions", SYSVAR_INSTRUCTIONS_ID, false, false),
    ]
}

fn pool_lookup_table(offramp: Address) -> DerivedLookupTable {
    DerivedLookupTable {
        name: names::POOL_LOOKUP_TABLE.to_string(),
        accounts: Lookup::derived(
            "TokenAdminRegistry",
            referenced_program(offramp, "Router"),
            vec![
                Seed::literal(b"token_admin_registry"),
                Seed::field(DEST_TOKEN_ADDRESS_PATH, IdlType::Pubkey),
            ],
        )
        .with_internal_field("TokenAdminRegistry", "LookupTable"),
        optional: true,
    }
}

fn execute_method(offramp: Address, from_address: Address, common_table: Address) -> MethodConfig {
    let mut accounts = common_accounts(offramp);
    accounts.push(offramp_pda(
        offramp,
        "SourceChainState",
        vec![
            Seed::literal(b"source_chain_state"),
            Seed::field(SOURCE_CHAIN_SELECTOR_PATH, IdlType::U64),
        ],
    ));
    accounts.push(
        offramp_pda(
            offramp,
            "CommitReport",
            vec![
                Seed::literal(b"commit_report"),
                Seed::field(SOURCE_CHAIN_SELECTOR_PATH, IdlType::U64),
                Seed::field(MERKLE_ROOT_PATH, IdlType::Array(Box::new(IdlType::U8), 32)),
            ],
        )
        .writable(),
    );
    accounts.extend(authority_accounts(from_address));
    accounts.push(offramp_pda(
        offramp,
        "ExternalExecutionConfig",
        vec![Seed::literal(b"external_execution_config")],
    ));
    accounts.push(offramp_pda(
        offramp,
        "ExternalTokenPoolsSigner",
        vec![Seed::literal(b"external_token_pools_signer")],
    ));
    accounts.push(Lookup::Field {
        name: "UserAccounts".to_string(),
        path: USER_ACCOUNTS_PATH.to_string(),
        value_type: IdlType::Pubkey,
        is_signer: MetaFlag::Value(false),
        is_writable: MetaFlag::Bitmap {
            bitmap_path: USER_ACCOUNTS_BITMAP_PATH.to_string(),
        },
        optional: true,
    });
    accounts.push(Lookup::table_slice(names::POOL_LOOKUP_TABLE, Some(vec![0])).optional());

    MethodConfig {
        from_address,
        chain_specific_name: "execute".to_string(),
        input_modifiers: vec![
            Modifier::rename(&[("ReportContextByteWords", "ReportContext")]),
            Modifier::rename(&[("RawExecutionReport", "Report")]),
        ],
        args_transform: Some(ArgsTransform::CcipTokenIndexes {
            table: names::POOL_LOOKUP_TABLE.to_string(),
        }),
        accounts,
        lookup_tables: LookupTables {
            derived: vec![pool_lookup_table(offramp)],
            static_tables: vec![common_table],
        },
        atas: vec![AtaLookup {
            name: "ReceiverTokenAccount".to_string(),
            mint_path: DEST_TOKEN_ADDRESS_PATH.to_string(),
            owner: Lookup::field("Receiver", RECEIVER_PATH),
            token_program: Lookup::table_slice(
                names::POOL_LOOKUP_TABLE,
                Some(vec![POOL_TABLE_TOKEN_PROGRAM_INDEX]),
            ),
            optional: true,
        }],
        compute_unit_overhead: EXECUTE_COMPUTE_UNIT_OVERHEAD,
        buffer_method: Some(BufferMethod {
            chain_specific_name: "buffer_execution_report".to_string(),
            chunk_size: EXECUTION_REPORT_BUFFER_CHUNK,
            seed_prefix: b"execution_report_buffer".to_vec(),
            buffered_arg: "RawExecutionReport".to_string(),
        }),
        debug_path: EXECUTE_DEBUG_PATH.to_string(),
    }
}

fn commit_method(offramp: Address, from_address: Address, common_table: Address) -> MethodConfig {
    let fee_quoter = referenced_program(offramp, "FeeQuoter");
    let mut accounts = common_accounts(offramp);
    accounts.push(
        offramp_pda(
            offramp,
            "SourceChainState",
            vec![
                Seed::literal(b"source_chain_state"),
                Seed::field(MERKLE_ROOT_CHAIN_SELECTOR_PATH, IdlType::U64),
            ],
        )
        .writable()
        .optional(),
    );
    accounts.push(
        offramp_pda(
            offramp,
            "CommitReport",
            vec![
                Seed::literal(b"commit_report"),
                Seed::field(MERKLE_ROOT_CHAIN_SELECTOR_PATH, IdlType::U64),
                Seed::field(MERKLE_ROOT_PATH, IdlType::Array(Box::new(IdlType::U8), 32)),
            ],
        )
        .writable()
        .optional(),
    );
    accounts.extend(authority_accounts(from_address));
    accounts.push(offramp_pda(offramp, "GlobalState", vec![Seed::literal(b"state")]).writable());
    accounts.push(
        Lookup::derived(
            "BillingTokenConfig",
            fee_quoter.clone(),
            vec![
                Seed::literal(b"fee_billing_token_config"),
                Seed::field(TOKEN_PRICE_TOKEN_PATH, IdlType::Pubkey),
            ],
        )
        .writable()
        .optional(),
    );
    accounts.push(
        Lookup::derived(
            "ChainConfigGasPrice",
            fee_quoter,
            vec![
                Seed::literal(b"dest_chain"),
                Seed::field(GAS_PRICE_CHAIN_SELECTOR_PATH, IdlType::U64),
            ],
        )
        .writable()
        .optional(),
    );

    MethodConfig {
        from_address,
        chain_specific_name: "commit".to_string(),
        input_modifiers: vec![
            Modifier::rename(&[("ReportContextByteWords", "ReportContext")]),
            Modifier::rename(&[("RawReport", "Report")]),
        ],
        args_transform: None,
        accounts,
        lookup_tables: LookupTables {
            derived: Vec::new(),
            static_tables: vec![common_table],
        },
        atas: Vec::new(),
        compute_unit_overhead: 0,
        buffer_method: None,
        debug_path: String::new(),
    }
}

/// The OffRamp writer: `Execute` and `Commit`.
///
/// `common_table` is the OffRamp's own address lookup table; `from_address` signs and
/// pays for every transaction.
pub fn offramp_writer_config(
    offramp: Address,
    common_table: Address,
    from_address: Address,
) -> Result<WriterConfig, Error> {
    if from_address == Address::default() {
        return Err(Error::config("writer from address cannot be empty"));
    }
    let mut methods = BTreeMap::new();
    methods.insert(
        names::METHOD_EXECUTE.to_string(),
        execute_method(offramp, from_address, common_table),
    );
    methods.insert(
        names::METHOD_COMMIT.to_string(),
        commit_method(offramp, from_address, common_table),
    );
    let mut programs = BTreeMap::new();
    programs.insert(
        names::OFF_RAMP.to_string(),
        ProgramConfig {
            address: offramp,
            idl: offramp_idl()?,
            methods,
        },
    );
    let config = WriterConfig {
        version: CONFIG_VERSION,
        max_instruction_data_len: DEFAULT_MAX_INSTRUCTION_DATA_LEN,
        programs,
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;
    use crate::config::merge_reader_configs;

    #[test]
    fn bundled_configs_validate() {
        let dest = dest_reader_config().unwrap();
        assert_eq!(dest.namespaces.len(), 7);
        assert_eq!(
            dest.share_group(names::NONCE_MANAGER),
            vec![names::ROUTER.to_string(), names::NONCE_MANAGER.to_string()]
        );
        let source = source_reader_config().unwrap();
        assert!(source.namespaces[names::ON_RAMP].reads.contains_key(names::CCIP_MESSAGE_SENT));
    }

    #[test]
    fn fee_quoter_idl_is_patched() {
        let idl = fee_quoter_idl().unwrap();
        assert!(idl.account("USDPerToken").is_some());
        assert!(idl.account("BillingTokenConfigWrapper").is_some());
    }

    #[test]
    fn merged_configs_join_router_groups() {
        let merged =
            merge_reader_configs(&[dest_reader_config().unwrap(), source_reader_config().unwrap()]);
        assert!(merged.validate().is_ok());
        let group = merged.share_group(names::ON_RAMP);
        assert!(group.contains(&names::NONCE_MANAGER.to_string()));
    }

    #[test]
    fn empty_from_address_is_rejected() {
        let err = offramp_writer_config(
            Address::new_unique(),
            Address::new_unique(),
            Address::default(),
        );
        assert!(matches!(err, Err(Error::Config { .. })));
    }

    #[test]
    fn writer_config_validates() {
        let config = offramp_writer_config(
            Address::new_unique(),
            Address::new_unique(),
            Address::new_unique(),
        )
        .unwrap();
        let execute = &config.programs[names::OFF_RAMP].methods[names::METHOD_EXECUTE];
        assert_eq!(execute.lookup_tables.derived.len(), 1);
        assert!(execute.buffer_method.is_some());
    }
}
