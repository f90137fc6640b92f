//! Engine and network configuration

use alloy_primitives::{Address, Bytes, B256};
use offchan_commitments::{derive_multisig_address, DomainParams};
use std::time::Duration;

/// Tunables of one engine instance.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Prefix of bus subjects this engine publishes and subscribes on.
    pub service_key: String,
    /// How long `send_and_wait` waits for the counterparty's reply.
    pub protocol_timeout: Duration,
    /// Dispute timeout (in blocks) of the free-balance app.
    pub free_balance_timeout: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            service_key: "offchan".to_string(),
            protocol_timeout: Duration::from_secs(30),
            free_balance_timeout: 8640,
        }
    }
}

impl EngineConfig {
    /// Set the bus subject prefix.
    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = key.into();
        self
    }

    /// Set the counterparty response timeout.
    pub fn with_protocol_timeout(mut self, timeout: Duration) -> Self {
        self.protocol_timeout = timeout;
        self
    }

    /// Set the free-balance dispute timeout in blocks.
    pub fn with_free_balance_timeout(mut self, blocks: u64) -> Self {
        self.free_balance_timeout = blocks;
        self
    }
}

/// Deployed contract addresses and domain parameters for one chain.
#[derive(Clone, Debug)]
pub struct NetworkContext {
    /// Chain id commitments are domain-separated under.
    pub chain_id: u64,
    /// Dispute adjudication contract.
    pub challenge_registry: Address,
    /// Multisig master copy behind every channel proxy.
    pub multisig_master_copy: Address,
    /// CREATE2 factory deploying channel proxies.
    pub proxy_factory: Address,
    /// Creation code of the channel proxy.
    pub proxy_init_code: Bytes,
    /// Delegate-call target settling adjudicated outcomes.
    pub outcome_executor: Address,
    /// App definition backing the free balance.
    pub free_balance_app_definition: Address,
    /// Interpreter routing multi-asset outcomes.
    pub multi_asset_interpreter: Address,
    /// Multisig domain name.
    pub domain_name: String,
    /// Multisig domain version.
    pub domain_version: String,
    /// Multisig domain salt.
    pub domain_salt: B256,
}

impl NetworkContext {
    /// Domain parameters for multisig digests on this network.
    pub fn domain(&self) -> DomainParams {
        DomainParams {
            name: self.domain_name.clone(),
            version: self.domain_version.clone(),
            chain_id: self.chain_id,
            salt: self.domain_salt,
        }
    }

    /// The CREATE2-deterministic multisig for an owner pair.
    pub fn multisig_for(&self, owners: [Address; 2]) -> Address {
        derive_multisig_address(
            owners,
            self.multisig_master_copy,
            self.proxy_factory,
            &self.proxy_init_code,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let cfg = EngineConfig::default()
            .with_service_key("test")
            .with_protocol_timeout(Duration::from_millis(250))
            .with_free_balance_timeout(100);
        assert_eq!(cfg.service_key, "test");
        assert_eq!(cfg.protocol_timeout, Duration::from_millis(250));
        assert_eq!(cfg.free_balance_timeout, 100);
    }
}
