#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::dbg_macro,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::panic,
    )
)]

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod lookup;
pub mod modifiers;
pub mod path;
pub mod reader;
pub mod scope;
pub mod types;
pub mod writer;

pub use client::{ChainClient, InMemoryChainClient};
pub use codec::{Idl, IdlType, SchemaRegistry};
pub use config::{ReaderConfig, WriterConfig, merge_reader_configs};
pub use error::{Error, WriteAssemblyError};
pub use lookup::{Lookup, LookupResolver, MetaFlag, Seed};
pub use modifiers::{ElementPosition, Modifier};
pub use reader::{ReadExecutor, ReadRequest};
pub use scope::{CallOptions, CallScope, ResolutionState};
pub use types::{AccountMeta, Address, EventFilter, Instruction, RawEvent, Record};
pub use writer::{AssembledInstruction, WriteAssembler};
