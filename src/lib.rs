pub mod template;
pub mod lcs;
pub mod trie;
pub mod generalize;
pub mod registry;
pub mod watchdog;
pub mod param_extractor;
pub mod tokenizer;
pub mod log_format;
pub mod persistence;
pub mod miner;
pub mod output;
pub mod logging;
