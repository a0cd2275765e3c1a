//! First-start bootstrap phase.
//!
//! Run once by the daemon before the node starts: seeds the authority set on
//! a fresh federation, settles the starting entry height, and logs the
//! effective configuration.

use meridian_store::NodeStore;
use meridian_types::ChainId;

use crate::config::NodeConfig;
use crate::node_state::NodeState;
use crate::state::ConsensusState;
use crate::NodeError;

/// What the bootstrap phase did.
#[derive(Debug, PartialEq, Eq)]
pub struct BootstrapReport {
    /// The authority installed because the set was empty.
    pub installed_authority: Option<ChainId>,
    pub entry_height: u32,
    pub entry_height_source: EntryHeightSource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryHeightSource {
    /// `sync2` forced the value.
    Forced,
    Store,
    /// Nothing stored yet, or the read failed.
    Default,
}

#[derive(Debug, Default)]
pub struct Bootstrapper {
    done: bool,
}

impl Bootstrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Run the phase. Later calls return `Ok(None)` without touching state.
    pub fn run(
        &mut self,
        config: &NodeConfig,
        state: &NodeState,
        store: &dyn NodeStore,
    ) -> Result<Option<BootstrapReport>, NodeError> {
        if self.done {
            return Ok(None);
        }

        let installed_authority = if state.has_authorities() {
            None
        } else {
            let first = config
                .bootstrap_chain_id()?
                .unwrap_or_else(|| state.identity());
            let name = if first == state.identity() {
                config.node_name.clone()
            } else {
                format!("authority-{}", first.short())
            };
            state.install_authority(first, name);
            tracing::info!(chain_id = %first.short(), "installed first authority");
            Some(first)
        };

        let (entry_height, entry_height_source) = Self::entry_height(config, store)?;
        state.set_entry_height(entry_height);

        tracing::info!(
            node = %config.node_name,
            network = config.network.as_str(),
            identity = %state.identity(),
            leader = config.leader,
            block_time_secs = config.block_time_secs,
            entry_height,
            source = ?entry_height_source,
            data_dir = %config.data_dir.display(),
            rpc = config.enable_rpc,
            rpc_port = config.rpc_port,
            "bootstrap complete"
        );

        self.done = true;
        Ok(Some(BootstrapReport {
            installed_authority,
            entry_height,
            entry_height_source,
        }))
    }

    fn entry_height(
        config: &NodeConfig,
        store: &dyn NodeStore,
    ) -> Result<(u32, EntryHeightSource), NodeError> {
        if config.sync2 >= 0 {
            let forced = u32::try_from(config.sync2)
                .map_err(|_| NodeError::Config(format!("sync2 out of range: {}", config.sync2)))?;
            store.save_entry_height(forced)?;
            return Ok((forced, EntryHeightSource::Forced));
        }
        match store.fetch_entry_height() {
            Ok(Some(height)) => Ok((height, EntryHeightSource::Store)),
            Ok(None) => Ok((0, EntryHeightSource::Default)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read entry height, starting from 0");
                Ok((0, EntryHeightSource::Default))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::MessageFilters;
    use crate::metrics::NodeMetrics;
    use crate::queues::queue_set;
    use meridian_nullables::NullStore;
    use std::sync::Arc;

    fn state(config: &NodeConfig) -> NodeState {
        let metrics = NodeMetrics::new();
        let (_p, _d, queues) = queue_set(config, &metrics.inbound_queue_depth);
        NodeState::new(config, queues, Arc::new(MessageFilters::new())).unwrap()
    }

    #[test]
    fn runs_once() {
        let config = NodeConfig::default();
        let state = state(&config);
        let store = NullStore::new();
        let mut boot = Bootstrapper::new();

        let report = boot.run(&config, &state, &store).unwrap().unwrap();
        assert_eq!(report.installed_authority, Some(state.identity()));
        assert_eq!(report.entry_height_source, EntryHeightSource::Default);
        assert!(boot.is_done());

        assert_eq!(boot.run(&config, &state, &store).unwrap(), None);
        assert_eq!(state.authorities().len(), 1);
    }

    #[test]
    fn configured_authority_is_installed() {
        let other = ChainId::new([7; 32]);
        let config = NodeConfig {
            bootstrap_identity: Some(other.to_string()),
            ..NodeConfig::default()
        };
        let state = state(&config);
        let report = Bootstrapper::new()
            .run(&config, &state, &NullStore::new())
            .unwrap()
            .unwrap();
        assert_eq!(report.installed_authority, Some(other));
        assert!(!state.leader_view().run_leader);
    }

    #[test]
    fn existing_authorities_are_kept() {
        let config = NodeConfig::default();
        let state = state(&config);
        state.install_authority(ChainId::new([3; 32]), "existing");
        let report = Bootstrapper::new()
            .run(&config, &state, &NullStore::new())
            .unwrap()
            .unwrap();
        assert_eq!(report.installed_authority, None);
        assert_eq!(state.authorities().len(), 1);
    }

    #[test]
    fn sync2_forces_and_persists_entry_height() {
        let config = NodeConfig {
            sync2: 17,
            ..NodeConfig::default()
        };
        let state = state(&config);
        let store = NullStore::new();
        store.save_entry_height(3).unwrap();
        let report = Bootstrapper::new()
            .run(&config, &state, &store)
            .unwrap()
            .unwrap();
        assert_eq!(report.entry_height, 17);
        assert_eq!(report.entry_height_source, EntryHeightSource::Forced);
        assert_eq!(store.fetch_entry_height().unwrap(), Some(17));
        assert_eq!(state.entry_height(), 17);
    }

    #[test]
    fn stored_entry_height_is_used() {
        let config = NodeConfig::default();
        let state = state(&config);
        let store = NullStore::new();
        store.save_entry_height(9).unwrap();
        let report = Bootstrapper::new()
            .run(&config, &state, &store)
            .unwrap()
            .unwrap();
        assert_eq!(report.entry_height, 9);
        assert_eq!(report.entry_height_source, EntryHeightSource::Store);
    }

    #[test]
    fn read_failure_keeps_default() {
        let config = NodeConfig::default();
        let state = state(&config);
        let store = NullStore::failing_reads();
        let report = Bootstrapper::new()
            .run(&config, &state, &store)
            .unwrap()
            .unwrap();
        assert_eq!(report.entry_height, 0);
        assert_eq!(report.entry_height_source, EntryHeightSource::Default);
    }
}
