//! Scripted state collaborator shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use meridian_crypto::{chain_id_for, keypair_from_seed, sign_message};
use meridian_store::StateSnapshot;
use meridian_types::{ChainId, KeyPair, PublicKey, Signature, Timestamp};

use crate::state::{ConsensusState, LeaderView};

pub(crate) struct ScriptedState {
    process_work: AtomicUsize,
    update_work: AtomicUsize,
    process_calls: AtomicUsize,
    update_calls: AtomicUsize,
    height: AtomicU32,
    minute: AtomicU8,
    vm_index: AtomicU32,
    run_leader: AtomicBool,
    db_finished: AtomicBool,
    panic_next: AtomicBool,
    snapshot_delay_ms: AtomicU64,
    keypair: KeyPair,
}

impl ScriptedState {
    /// No queued work, not a leader, replay finished.
    pub fn idle() -> Self {
        Self {
            process_work: AtomicUsize::new(0),
            update_work: AtomicUsize::new(0),
            process_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            height: AtomicU32::new(0),
            minute: AtomicU8::new(0),
            vm_index: AtomicU32::new(0),
            run_leader: AtomicBool::new(false),
            db_finished: AtomicBool::new(true),
            panic_next: AtomicBool::new(false),
            snapshot_delay_ms: AtomicU64::new(0),
            keypair: keypair_from_seed(&[42u8; 32]),
        }
    }

    /// Leader-capable at (height, minute), vm 0.
    pub fn leader_at(height: u32, minute: u8) -> Self {
        let state = Self::idle();
        state.set_leader(true);
        state.set_height(height);
        state.set_minute(minute);
        state
    }

    fn take_work(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn queue_process_work(&self, n: usize) {
        self.process_work.fetch_add(n, Ordering::SeqCst);
    }

    pub fn queue_update_work(&self, n: usize) {
        self.update_work.fetch_add(n, Ordering::SeqCst);
    }

    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn set_height(&self, height: u32) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub fn set_minute(&self, minute: u8) {
        self.minute.store(minute, Ordering::SeqCst);
    }

    pub fn set_leader(&self, leader: bool) {
        self.run_leader.store(leader, Ordering::SeqCst);
    }

    pub fn set_db_finished(&self, finished: bool) {
        self.db_finished.store(finished, Ordering::SeqCst);
    }

    pub fn panic_on_next_process(&self) {
        self.panic_next.store(true, Ordering::SeqCst);
    }

    /// Make every `snapshot` call block for `delay` first.
    pub fn set_snapshot_delay(&self, delay: Duration) {
        self.snapshot_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public
    }
}

impl ConsensusState for ScriptedState {
    fn process(&self) -> bool {
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scripted process fault");
        }
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        Self::take_work(&self.process_work)
    }

    fn update_state(&self) -> bool {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        Self::take_work(&self.update_work)
    }

    fn leader_view(&self) -> LeaderView {
        LeaderView {
            height: self.height.load(Ordering::SeqCst),
            minute: self.minute.load(Ordering::SeqCst),
            vm_index: self.vm_index.load(Ordering::SeqCst),
            run_leader: self.run_leader.load(Ordering::SeqCst),
            db_finished: self.db_finished.load(Ordering::SeqCst),
        }
    }

    fn identity(&self) -> ChainId {
        chain_id_for(&self.keypair.public)
    }

    fn sign(&self, bytes: &[u8]) -> Signature {
        sign_message(bytes, &self.keypair.private)
    }

    fn snapshot(&self) -> Option<StateSnapshot> {
        let delay = self.snapshot_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        let height = self.height.load(Ordering::SeqCst);
        Some(StateSnapshot {
            height,
            minute: self.minute.load(Ordering::SeqCst),
            vm_index: self.vm_index.load(Ordering::SeqCst),
            entry_height_complete: height.saturating_sub(1),
            saved_at: Timestamp::now(),
        })
    }
}
