use std::num::NonZeroU64;

use log::info;

use super::ModelHost;
use crate::{
    config::{AdmissionSpec, ConsistencySpec, ModelSpec, ServerConfig},
    error::Result,
    storage::MapStore,
    synchronization::{
        Admission, AdmitAll, BarrierModel, Checkpointer, ConsistencyModel, KeyRanges,
        ReplyQueue, SparseSspModel,
    },
};

/// Builds model hosts and their models from config specs.
pub struct ModelBuilder {
    replies: ReplyQueue,
}

impl ModelBuilder {
    /// Creates a new `ModelBuilder`.
    ///
    /// # Arguments
    /// * `replies` - The reply queue every built host and model pushes into.
    pub fn new(replies: ReplyQueue) -> Self {
        Self { replies }
    }

    /// Builds a host with every model of `config` registered and restored.
    ///
    /// # Returns
    /// The host, or the first registration or snapshot loading failure.
    pub fn build_host(&self, config: &ServerConfig) -> Result<ModelHost> {
        let mut host = ModelHost::new(config.server_id, self.replies.clone());

        for spec in &config.models {
            let model = self.build(config.server_id, spec)?;
            host.register(spec.model_id, model)?;
        }

        info!(server_id = config.server_id, models = host.len(); "model host built");
        Ok(host)
    }

    /// Builds a single model following `spec`.
    ///
    /// # Arguments
    /// * `server_id` - The server that will host the model.
    /// * `spec` - How the model is configured.
    ///
    /// # Returns
    /// The model, or an io error if its snapshot couldn't be loaded.
    pub fn build(&self, server_id: u32, spec: &ModelSpec) -> Result<Box<dyn ConsistencyModel>> {
        let checkpointer = Checkpointer::new(
            spec.checkpoint.interval,
            spec.checkpoint.prefix.clone(),
            server_id,
        );

        let mut model: Box<dyn ConsistencyModel> = match &spec.consistency {
            ConsistencySpec::Barrier => {
                let model = BarrierModel::new(
                    spec.model_id,
                    MapStore::new(),
                    self.replies.clone(),
                    checkpointer,
                )
                .with_workers(spec.workers.iter().copied());

                Box::new(model)
            }
            ConsistencySpec::SparseSsp {
                staleness,
                admission,
            } => match admission {
                AdmissionSpec::AdmitAll => {
                    self.terminate_sparse(spec, *staleness, AdmitAll, checkpointer)
                }
                AdmissionSpec::KeyRanges { ranges } => {
                    let ranges = ranges.iter().map(|&(start, end)| start..end).collect();
                    let admission = KeyRanges::new(ranges);
                    self.terminate_sparse(spec, *staleness, admission, checkpointer)
                }
            },
        };

        if let Some(path) = &spec.load_from {
            model.load(path)?;
        }

        Ok(model)
    }

    /// Terminates the build of a sparse model once its admission controller is resolved.
    fn terminate_sparse<A>(
        &self,
        spec: &ModelSpec,
        staleness: NonZeroU64,
        admission: A,
        checkpointer: Checkpointer,
    ) -> Box<dyn ConsistencyModel>
    where
        A: Admission + 'static,
    {
        let model = SparseSspModel::new(
            spec.model_id,
            MapStore::new(),
            self.replies.clone(),
            staleness,
            admission,
            checkpointer,
        )
        .with_workers(spec.workers.iter().copied());

        Box::new(model)
    }
}
