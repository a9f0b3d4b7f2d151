//! # Staged Loader
//!
//! Partitions the configuration document's top-level keys by feature kind and loads them
//! stage by stage.
//!
//! ```text
//!   ┌──────────── CONF pass ────────────┐
//!   │ claim CONF keys (remove from doc) │◀──┐  repeat while a pass claims anything,
//!   │ load them as one group            │───┘  at most `max_conf_passes` times
//!   └───────────────────────────────────┘
//!                    │
//!                    ▼
//!   INIT ──▶ SERVICE ──▶ PLUGIN ──▶ FINAL      (every group runs, even empty ones)
//! ```
//!
//! Members of one group are polled together on the caller's task and the group
//! completes only when every member has settled. Groups run strictly one after another.
//!
//! During the CONF scan a name that fails to resolve is logged and skipped, because a
//! later CONF feature may still register where it lives. Once the CONF stage is done,
//! resolution failures are fatal.

use crate::container::ServiceContainer;
use crate::error::ContainerError;
use crate::events::LifecycleEvent;
use crate::feature::FeatureKind;
use crate::resolver::FeatureDescriptor;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Default upper bound on configuration-stage passes.
pub const DEFAULT_MAX_CONF_PASSES: usize = 16;

struct StageMember {
    name: String,
    descriptor: FeatureDescriptor,
    options: Value,
}

/// Drives one container through the CONF loop and the four ordered stages.
pub struct StagedLoader<'a> {
    container: &'a ServiceContainer,
    max_conf_passes: usize,
}

impl<'a> StagedLoader<'a> {
    pub fn new(container: &'a ServiceContainer) -> Self {
        Self {
            container,
            max_conf_passes: container.options().max_conf_passes,
        }
    }

    pub fn with_max_conf_passes(mut self, passes: usize) -> Self {
        self.max_conf_passes = passes;
        self
    }

    pub async fn run(&self) -> Result<(), ContainerError> {
        let mut passes = 0;
        loop {
            let claimed = self.claim_conf_features();
            if claimed.is_empty() {
                break;
            }
            if passes >= self.max_conf_passes {
                return Err(ContainerError::ConfigStageOverflow(passes));
            }
            passes += 1;
            debug!(pass = passes, features = claimed.len(), "Configuration pass");
            self.load_group(FeatureKind::Conf, claimed).await?;
        }

        let buckets = self.partition()?;
        for (stage, members) in FeatureKind::ORDERED.into_iter().zip(buckets) {
            self.load_group(stage, members).await?;
        }
        Ok(())
    }

    /// Resolve every allowed key, take the CONF ones out of the document.
    fn claim_conf_features(&self) -> Vec<StageMember> {
        let mut claimed = Vec::new();
        for (name, options) in self.container.config() {
            if !self.container.options().is_allowed(&name) {
                continue;
            }
            match self.container.resolve_feature(&name) {
                Ok(descriptor) if descriptor.kind() == FeatureKind::Conf => claimed.push(StageMember {
                    name,
                    descriptor,
                    options,
                }),
                Ok(_) => {}
                Err(error) => warn!(feature = %name, %error, "Skipping unresolvable feature during configuration scan"),
            }
        }

        if !claimed.is_empty() {
            self.container.update_config(|config| {
                for member in &claimed {
                    config.shift_remove(&member.name);
                }
            });
        }
        claimed
    }

    /// Split the remaining allowed keys into the INIT, SERVICE, PLUGIN and FINAL groups.
    fn partition(&self) -> Result<[Vec<StageMember>; 4], ContainerError> {
        let mut buckets: [Vec<StageMember>; 4] = Default::default();
        for (name, options) in self.container.config() {
            if !self.container.options().is_allowed(&name) {
                continue;
            }
            let descriptor = self.container.resolve_feature(&name)?;
            let slot = match descriptor.kind() {
                FeatureKind::Init => 0,
                FeatureKind::Service => 1,
                FeatureKind::Plugin => 2,
                FeatureKind::Final => 3,
                kind @ FeatureKind::Conf => {
                    return Err(ContainerError::InvalidFeatureType { feature: name, kind });
                }
            };
            buckets[slot].push(StageMember {
                name,
                descriptor,
                options,
            });
        }
        Ok(buckets)
    }

    async fn load_group(&self, stage: FeatureKind, members: Vec<StageMember>) -> Result<(), ContainerError> {
        self.container.emit(&LifecycleEvent::BeforeStage(stage));
        let count = members.len();

        try_join_all(members.into_iter().map(|member| self.load_member(member))).await?;

        self.container.emit(&LifecycleEvent::AfterStage(stage));
        if count > 0 {
            info!(%stage, features = count, "Stage loaded");
        }
        Ok(())
    }

    async fn load_member(&self, member: StageMember) -> Result<(), ContainerError> {
        let StageMember {
            name,
            descriptor,
            options,
        } = member;

        self.container.emit(&LifecycleEvent::BeforeLoad(&name));
        descriptor
            .load(self.container, options)
            .await
            .map_err(|source| ContainerError::FeatureLoad {
                feature: name.clone(),
                source: Box::new(source),
            })?;
        self.container.mark_loaded(&name);
        self.container.emit(&LifecycleEvent::AfterLoad(&name));

        debug!(feature = %name, kind = %descriptor.kind(), origin = %descriptor.origin().display(), "Feature loaded");
        Ok(())
    }
}
