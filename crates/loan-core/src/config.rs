//! Client configuration.
//!
//! Loaded from JSON; every field has a default so an empty object is a valid
//! devnet configuration.

use serde::{Deserialize, Serialize};

use chain_sol::Pubkey;

use crate::error::LoanError;
use crate::rpc::Commitment;

/// The deployed loan program on devnet.
pub const DEFAULT_PROGRAM_ID: &str = "Dtj6mjrmMLFEywJ3D1qyMsLR1ibbruQdoPcWB25x57Jy";

/// Credit score sent with every new application.
pub const DEFAULT_CREDIT_SCORE: u16 = 700;

/// Extra lamports added on top of the loan amount when the program fund has
/// to be topped up before an approval.
pub const DEFAULT_FUNDING_FEE_BUFFER: u64 = 10_000_000;

/// Which submission strategy backs the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionMode {
    #[default]
    Chain,
    Simulated,
}

impl SubmissionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionMode::Chain => "chain",
            SubmissionMode::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cluster {
    #[default]
    Devnet,
    Testnet,
    MainnetBeta,
}

impl Cluster {
    pub fn rpc_url(&self) -> &'static str {
        match self {
            Cluster::Devnet => "https://api.devnet.solana.com",
            Cluster::Testnet => "https://api.testnet.solana.com",
            Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
        }
    }

    /// Airdrops only exist on the test clusters.
    pub fn supports_airdrop(&self) -> bool {
        !matches!(self, Cluster::MainnetBeta)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoanConfig {
    pub program_id: String,
    pub mode: SubmissionMode,
    pub cluster: Cluster,
    pub commitment: Commitment,
    pub default_credit_score: u16,
    pub funding_fee_buffer: u64,
}

impl Default for LoanConfig {
    fn default() -> Self {
        Self {
            program_id: DEFAULT_PROGRAM_ID.to_string(),
            mode: SubmissionMode::default(),
            cluster: Cluster::default(),
            commitment: Commitment::default(),
            default_credit_score: DEFAULT_CREDIT_SCORE,
            funding_fee_buffer: DEFAULT_FUNDING_FEE_BUFFER,
        }
    }
}

impl LoanConfig {
    pub fn from_json(json: &str) -> Result<Self, LoanError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LoanError::Config(e.to_string()))?;
        config.program_id()?;
        Ok(config)
    }

    pub fn simulated() -> Self {
        Self {
            mode: SubmissionMode::Simulated,
            ..Self::default()
        }
    }

    pub fn program_id(&self) -> Result<Pubkey, LoanError> {
        self.program_id
            .parse()
            .map_err(|e| LoanError::Config(format!("program_id: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = LoanConfig::from_json("{}").unwrap();
        assert_eq!(config, LoanConfig::default());
        assert_eq!(config.mode, SubmissionMode::Chain);
        assert_eq!(config.default_credit_score, 700);
        assert_eq!(config.funding_fee_buffer, 10_000_000);
        assert_eq!(config.commitment, Commitment::Confirmed);
    }

    #[test]
    fn mode_and_cluster_parse() {
        let config =
            LoanConfig::from_json(r#"{"mode":"simulated","cluster":"mainnet-beta"}"#).unwrap();
        assert_eq!(config.mode, SubmissionMode::Simulated);
        assert_eq!(config.cluster.rpc_url(), "https://api.mainnet-beta.solana.com");
        assert!(!config.cluster.supports_airdrop());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = LoanConfig::from_json(r#"{"retries":3}"#).unwrap_err();
        assert!(matches!(err, LoanError::Config(_)));
    }

    #[test]
    fn invalid_program_id_is_rejected() {
        let err = LoanConfig::from_json(r#"{"program_id":"nope"}"#).unwrap_err();
        assert!(err.to_string().contains("program_id"));
    }

    #[test]
    fn default_program_id_parses() {
        let id = LoanConfig::default().program_id().unwrap();
        assert_eq!(id.to_string(), DEFAULT_PROGRAM_ID);
    }
}
