use std::{
    collections::HashSet,
    fs,
    num::NonZeroU64,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    error::{EngineErr, Result},
    message::{Key, ModelId, WorkerId},
};

/// Every server hosted by one process.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub servers: Vec<ServerConfig>,
}

/// A model host and the models it serves.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub server_id: u32,
    #[serde(default)]
    pub models: Vec<ModelSpec>,
}

/// How a single model instance is built.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSpec {
    pub model_id: ModelId,
    #[serde(default)]
    pub workers: Vec<WorkerId>,
    pub consistency: ConsistencySpec,
    #[serde(default)]
    pub checkpoint: CheckpointSpec,
    /// A snapshot to restore before serving, failing to load it is fatal.
    #[serde(default)]
    pub load_from: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencySpec {
    Barrier,
    SparseSsp {
        staleness: NonZeroU64,
        #[serde(default)]
        admission: AdmissionSpec,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdmissionSpec {
    #[default]
    AdmitAll,
    /// Half open `[start, end)` key ranges.
    KeyRanges { ranges: Vec<(Key, Key)> },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckpointSpec {
    #[serde(default)]
    pub interval: i64,
    #[serde(default)]
    pub prefix: String,
}

impl NodeConfig {
    /// Reads and validates a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            EngineErr::Config(format!("can't read {}: {e}", path.display()))
        })?;

        Self::from_json(&text)
    }

    /// Parses and validates a JSON config.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| EngineErr::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut server_ids = HashSet::new();

        for server in &self.servers {
            if !server_ids.insert(server.server_id) {
                let msg = format!("server {} is declared twice", server.server_id);
                return Err(EngineErr::Config(msg));
            }

            let mut model_ids = HashSet::new();
            for spec in &server.models {
                if !model_ids.insert(spec.model_id) {
                    let msg = format!(
                        "model {} is declared twice in server {}",
                        spec.model_id, server.server_id
                    );
                    return Err(EngineErr::Config(msg));
                }

                spec.validate()?;
            }
        }

        Ok(())
    }
}

impl ModelSpec {
    fn validate(&self) -> Result<()> {
        let ConsistencySpec::SparseSsp {
            admission: AdmissionSpec::KeyRanges { ranges },
            ..
        } = &self.consistency
        else {
            return Ok(());
        };

        match ranges.iter().find(|(start, end)| start >= end) {
            Some((start, end)) => Err(EngineErr::Config(format!(
                "model {} has an empty key range [{start}, {end})",
                self.model_id
            ))),
            None => Ok(()),
        }
    }
}
