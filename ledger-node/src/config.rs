use crate::consensus::ConsensusConfig;
use crate::mempool::MempoolConfig;
use crate::threshold::parse_modulus;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use weave_common::{WeaveError, WeaveResult};

/// Environment variables such as `WEAVE__MEMPOOL__MAX_TRANSACTIONS`
/// override file values.
pub const ENV_PREFIX: &str = "WEAVE";
pub const ENV_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub ledger: LedgerSection,
    pub consensus: ConsensusConfig,
    pub mempool: MempoolConfig,
    pub threshold: ThresholdSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// One ledger graph is hosted per collection
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSection {
    pub threshold: usize,
    pub modulus_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub filter: String,
}

/// Command line values applied on top of file and environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub collections: Option<Vec<String>>,
    pub difficulty: Option<usize>,
    pub threshold: Option<usize>,
    pub log_filter: Option<String>,
}

impl NodeConfig {
    /// Load configuration from an optional TOML file, then environment,
    /// then command line overrides
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> WeaveResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let mut config: NodeConfig = builder
            .build()
            .and_then(|raw| raw.try_deserialize())
            .map_err(|e| WeaveError::Config(format!("Failed to load configuration: {}", e)))?;

        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(collections) = overrides.collections {
            self.ledger.collections = collections;
        }
        if let Some(difficulty) = overrides.difficulty {
            self.consensus = ConsensusConfig::ProofOfWork { difficulty };
        }
        if let Some(threshold) = overrides.threshold {
            self.threshold.threshold = threshold;
        }
        if let Some(filter) = overrides.log_filter {
            self.logging.filter = filter;
        }
    }

    pub fn validate(&self) -> WeaveResult<()> {
        if self.ledger.collections.is_empty() {
            return Err(WeaveError::Config("At least one ledger collection is required".to_string()));
        }
        if self.ledger.collections.iter().any(|name| name.trim().is_empty()) {
            return Err(WeaveError::Config("Collection names cannot be empty".to_string()));
        }
        if self.threshold.threshold == 0 {
            return Err(WeaveError::Config("Threshold must be greater than 0".to_string()));
        }
        if self.mempool.max_transactions == 0 {
            return Err(WeaveError::Config("Mempool capacity must be greater than 0".to_string()));
        }
        self.modulus()?;
        Ok(())
    }

    pub fn modulus(&self) -> WeaveResult<BigUint> {
        parse_modulus(&self.threshold.modulus_hex)
            .map_err(|e| WeaveError::Config(format!("Invalid threshold modulus: {}", e)))
    }
}

impl Default for LedgerSection {
    fn default() -> Self {
        Self {
            collections: vec!["transactions".to_string()],
        }
    }
}

impl Default for ThresholdSection {
    fn default() -> Self {
        Self {
            threshold: 3,
            modulus_hex: "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141".to_string(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "weave_node=info,weave_common=info".to_string(),
        }
    }
}
