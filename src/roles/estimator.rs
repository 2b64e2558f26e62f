//! Estimator link: feeds queued evidence to the world-model estimator and
//! installs the model it returns.
//!
//! Startup sends `s` and the system description. Every cycle then:
//! 1. `m` → read the current model vector
//! 2. under one hub lock: store the model (version + 1), drain evidence and
//!    variance requests
//! 3. forward each evidence bundle as `e` + evidence and each variance
//!    request as `v <feature> <variance>`, then flush; on failure the whole
//!    batch goes back to the hub

use std::sync::Arc;

use super::{Pace, Role};
use crate::channel::Channel;
use crate::error::Result;
use crate::hub::StateHub;
use crate::types::{read_vector, Evidence, Feature, System};

pub struct EstimatorRole {
    system: System,
    warn_threshold: usize,
    hub: Arc<StateHub>,
    channel: Channel,
}

impl EstimatorRole {
    pub fn new(
        system: System,
        warn_threshold: usize,
        hub: Arc<StateHub>,
        channel: Channel,
    ) -> Self {
        Self {
            system,
            warn_threshold,
            hub,
            channel,
        }
    }
}

impl EstimatorRole {
    fn forward(&mut self, evidence: &[Evidence], variance: &[(Feature, f32)]) -> Result<()> {
        for bundle in evidence {
            self.channel.send("e")?;
            bundle.write(&mut self.channel)?;
        }
        for (feature, variance) in variance {
            self.channel.send(&format!("v {} {}", feature.0, variance))?;
        }
        self.channel.flush()
    }
}

impl Role for EstimatorRole {
    fn name(&self) -> &str {
        self.channel.name()
    }

    fn start(&mut self) -> Result<()> {
        self.hub.install_system(self.system.clone());
        self.channel.send("s")?;
        self.system.write(&mut self.channel)?;
        self.channel.flush()?;
        tracing::info!(
            "[{}] Estimator bootstrapped (dimension {})",
            self.channel.name(),
            self.system.dimension
        );
        Ok(())
    }

    fn cycle(&mut self) -> Result<Pace> {
        self.channel.send("m")?;
        self.channel.flush()?;
        let values = read_vector(&mut self.channel)?;

        let exchange = self.hub.exchange_model(values);
        let count = exchange.evidence.len();
        if count > self.warn_threshold {
            tracing::warn!(
                "[{}] {} evidence bundles queued in one cycle (high water {})",
                self.channel.name(),
                count,
                self.hub.evidence_high_water()
            );
        }

        // Nothing is delivered until the flush succeeds, so a failure anywhere
        // hands the whole batch back to the hub.
        if let Err(e) = self.forward(&exchange.evidence, &exchange.variance) {
            tracing::warn!(
                "[{}] Forward failed, requeueing {} evidence bundles",
                self.channel.name(),
                count
            );
            self.hub.requeue_evidence(exchange.evidence);
            self.hub.requeue_variance(exchange.variance);
            return Err(e);
        }

        tracing::debug!(
            "[{}] model v{} installed, {} evidence forwarded",
            self.channel.name(),
            exchange.version,
            count
        );
        Ok(Pace::Idle)
    }
}
