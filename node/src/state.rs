//! The interface the core loops use to drive and observe consensus state.

use meridian_store::StateSnapshot;
use meridian_types::{ChainId, Signature};

/// Read-only view used by round-end synthesis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaderView {
    pub height: u32,
    /// 0..=9, or 10 between blocks.
    pub minute: u8,
    pub vm_index: u32,
    /// Whether the node currently acts as round leader.
    pub run_leader: bool,
    /// Whether the initial state replay has completed.
    pub db_finished: bool,
}

/// State collaborator driven by the processing engine and consulted by the
/// dispatch loop.
///
/// `process` and `update_state` each perform at most one unit of work and
/// report whether they did any. They must return promptly: the engine batches
/// them and checks for shutdown between batches.
pub trait ConsensusState: Send + Sync + 'static {
    fn process(&self) -> bool;

    fn update_state(&self) -> bool;

    fn leader_view(&self) -> LeaderView;

    fn identity(&self) -> ChainId;

    fn sign(&self, bytes: &[u8]) -> Signature;

    /// Current state for the periodic saver; `None` if the state is not
    /// persisted.
    fn snapshot(&self) -> Option<StateSnapshot> {
        None
    }
}
