//! The daemon's consensus state: drains the classification queues, pairs
//! messages with leader acks, and advances height and minute as local
//! round-end signals are processed.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use meridian_crypto::{chain_id_for, sign_message};
use meridian_messages::{AckMessage, Message, GAP_MINUTE, LAST_MINUTE};
use meridian_store::StateSnapshot;
use meridian_types::{ChainId, KeyPair, MessageHash, NetworkId, Signature, Timestamp};

use crate::config::NodeConfig;
use crate::ingress::MessageFilters;
use crate::queues::StateQueues;
use crate::round_end::effective_minute;
use crate::state::{ConsensusState, LeaderView};
use crate::NodeError;

/// Messages kept for the `messages` debug call.
pub const JOURNAL_LIMIT: usize = 1000;

/// Cap on unacked messages and unmatched acks held within one block.
pub const HOLDING_LIMIT: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerRole {
    Federated,
    Audit,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Server {
    pub chain_id: ChainId,
    pub name: String,
    pub online: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Authority {
    pub chain_id: ChainId,
    pub role: ServerRole,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessListEntry {
    pub vm_index: u32,
    pub position: u32,
    pub minute: u8,
    pub message_hash: MessageHash,
    pub summary: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NetworkInfo {
    pub network_number: u8,
    pub network_name: &'static str,
    pub network_id: u32,
}

impl From<NetworkId> for NetworkInfo {
    fn from(network: NetworkId) -> Self {
        Self {
            network_number: network.number(),
            network_name: network.as_str(),
            network_id: network.magic(),
        }
    }
}

#[derive(Default)]
struct Inner {
    height: u32,
    minute: u8,
    leader: bool,
    db_finished: bool,
    eom_done: bool,
    entry_height_complete: u32,
    holding: HashMap<MessageHash, Message>,
    pending_acks: HashMap<MessageHash, AckMessage>,
    process_list: Vec<ProcessListEntry>,
    journal: VecDeque<Message>,
    federated: Vec<Server>,
    audit: Vec<Server>,
    authorities: Vec<Authority>,
}

impl Inner {
    fn vm_index_of(&self, id: &ChainId) -> Option<u32> {
        self.federated
            .iter()
            .position(|s| &s.chain_id == id)
            .map(|i| i as u32)
    }

    fn append(&mut self, vm_index: u32, message_hash: MessageHash, summary: String) {
        let position = self
            .process_list
            .iter()
            .filter(|e| e.vm_index == vm_index)
            .count() as u32;
        self.process_list.push(ProcessListEntry {
            vm_index,
            position,
            minute: self.minute,
            message_hash,
            summary,
        });
    }

    fn record(&mut self, msg: &Message) {
        if self.journal.len() == JOURNAL_LIMIT {
            self.journal.pop_front();
        }
        self.journal.push_back(msg.clone());
    }
}

pub struct NodeState {
    node_name: String,
    network: NetworkId,
    keypair: KeyPair,
    identity: ChainId,
    queues: Mutex<StateQueues>,
    filters: Arc<MessageFilters>,
    inner: Mutex<Inner>,
}

impl NodeState {
    pub fn new(
        config: &NodeConfig,
        queues: StateQueues,
        filters: Arc<MessageFilters>,
    ) -> Result<Self, NodeError> {
        let keypair = config.identity_keypair()?;
        let identity = chain_id_for(&keypair.public);
        let inner = Inner {
            leader: config.leader,
            ..Inner::default()
        };
        Ok(Self {
            node_name: config.node_name.clone(),
            network: config.network,
            keypair,
            identity,
            queues: Mutex::new(queues),
            filters,
            inner: Mutex::new(inner),
        })
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_message(&self) -> Option<Message> {
        let mut queues = self.queues.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(msg) = queues.ack_rx.try_recv() {
            return Some(msg);
        }
        queues.msg_rx.try_recv().ok()
    }

    /// Add a federated server and its authority record. Returns `false` if
    /// the identity was already an authority.
    pub fn install_authority(&self, chain_id: ChainId, name: impl Into<String>) -> bool {
        let mut inner = self.inner();
        if inner.authorities.iter().any(|a| a.chain_id == chain_id) {
            return false;
        }
        inner.authorities.push(Authority {
            chain_id,
            role: ServerRole::Federated,
        });
        inner.federated.push(Server {
            chain_id,
            name: name.into(),
            online: true,
        });
        true
    }

    pub fn add_audit_server(&self, chain_id: ChainId, name: impl Into<String>) {
        let mut inner = self.inner();
        if inner.audit.iter().any(|s| s.chain_id == chain_id) {
            return;
        }
        inner.authorities.push(Authority {
            chain_id,
            role: ServerRole::Audit,
        });
        inner.audit.push(Server {
            chain_id,
            name: name.into(),
            online: true,
        });
    }

    pub fn has_authorities(&self) -> bool {
        !self.inner().authorities.is_empty()
    }

    pub fn set_leader(&self, leader: bool) {
        self.inner().leader = leader;
    }

    pub fn set_entry_height(&self, height: u32) {
        self.inner().entry_height_complete = height;
    }

    pub fn entry_height(&self) -> u32 {
        self.inner().entry_height_complete
    }

    /// Resume from a saved snapshot. Replay is not marked finished here.
    pub fn restore(&self, snapshot: &StateSnapshot) {
        let mut inner = self.inner();
        inner.height = snapshot.height;
        inner.minute = snapshot.minute.min(GAP_MINUTE);
        inner.entry_height_complete = snapshot.entry_height_complete;
        inner.eom_done = false;
    }

    pub fn finish_replay(&self) {
        self.inner().db_finished = true;
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn current_minute(&self) -> u8 {
        self.inner().minute
    }

    pub fn height(&self) -> u32 {
        self.inner().height
    }

    pub fn federated_servers(&self) -> Vec<Server> {
        self.inner().federated.clone()
    }

    pub fn audit_servers(&self) -> Vec<Server> {
        self.inner().audit.clone()
    }

    pub fn authorities(&self) -> Vec<Authority> {
        self.inner().authorities.clone()
    }

    pub fn holding_queue(&self) -> Vec<Message> {
        self.inner().holding.values().cloned().collect()
    }

    /// Most recent processed messages, oldest first.
    pub fn journal(&self) -> Vec<Message> {
        self.inner().journal.iter().cloned().collect()
    }

    pub fn process_list(&self) -> Vec<ProcessListEntry> {
        self.inner().process_list.clone()
    }

    pub fn network_info(&self) -> NetworkInfo {
        self.network.into()
    }

    /// Process list rendered one entry per line.
    pub fn process_list_string(&self) -> String {
        let inner = self.inner();
        let mut out = format!("process list h{} m{}\n", inner.height, inner.minute);
        for entry in &inner.process_list {
            let _ = writeln!(
                out,
                "  vm{:02} [{:3}] {}",
                entry.vm_index, entry.position, entry.summary
            );
        }
        out
    }

    /// One-line status.
    pub fn summary(&self) -> String {
        let inner = self.inner();
        let lane = match inner.vm_index_of(&self.identity) {
            Some(vm) if inner.leader => format!("L vm{vm}"),
            _ => "F".to_string(),
        };
        format!(
            "{} {} h{} m{} eh{} hold {} pl {}{}",
            self.node_name,
            lane,
            inner.height,
            inner.minute,
            inner.entry_height_complete,
            inner.holding.len(),
            inner.process_list.len(),
            if inner.db_finished { "" } else { " replaying" },
        )
    }

    fn apply(&self, inner: &mut Inner, msg: Message) {
        match msg {
            Message::Eom(eom) => {
                let summary = eom.to_string();
                let current = inner.height == eom.db_height()
                    && effective_minute(inner.minute) == eom.minute()
                    && inner.vm_index_of(&self.identity) == Some(eom.vm_index());
                if eom.is_local() && eom.chain_id() == self.identity && current {
                    inner.eom_done = true;
                    inner.append(eom.vm_index(), eom.hash(), summary);
                } else {
                    tracing::trace!(eom = %summary, "round-end signal not for the current round");
                }
            }
            Message::Ack(ack) => match inner.holding.remove(&ack.message_hash) {
                Some(held) => inner.append(ack.vm_index, ack.message_hash, held.to_string()),
                None if inner.pending_acks.len() >= HOLDING_LIMIT => {
                    tracing::debug!(hash = %ack.message_hash, "pending acks full, dropping ack");
                }
                None => {
                    inner.pending_acks.insert(ack.message_hash, ack);
                }
            },
            msg @ Message::Network(_) => {
                let hash = msg.hash();
                if let Some(ack) = inner.pending_acks.remove(&hash) {
                    inner.append(ack.vm_index, hash, msg.to_string());
                    return;
                }
                let own_lane = inner.vm_index_of(&self.identity).filter(|_| inner.leader);
                match own_lane {
                    Some(vm) => inner.append(vm, hash, msg.to_string()),
                    None if inner.holding.len() >= HOLDING_LIMIT => {
                        tracing::debug!(hash = %hash, "holding queue full, dropping message");
                    }
                    None => {
                        inner.holding.insert(hash, msg);
                    }
                }
            }
        }
    }
}

impl ConsensusState for NodeState {
    fn process(&self) -> bool {
        let Some(msg) = self.next_message() else {
            return false;
        };
        let mut inner = self.inner();
        if !self.filters.blocks_output(&msg) {
            inner.record(&msg);
        }
        self.apply(&mut inner, msg);
        true
    }

    fn update_state(&self) -> bool {
        let mut inner = self.inner();
        if inner.minute >= GAP_MINUTE {
            inner.entry_height_complete = inner.height;
            inner.height += 1;
            inner.minute = 0;
            inner.eom_done = false;
            inner.process_list.clear();
            let expired = inner.holding.len() + inner.pending_acks.len();
            inner.holding.clear();
            inner.pending_acks.clear();
            tracing::debug!(height = inner.height, expired, "block complete");
            return true;
        }
        if inner.eom_done {
            inner.eom_done = false;
            inner.minute += 1;
            if inner.minute > LAST_MINUTE {
                tracing::trace!(height = inner.height, "entering gap minute");
            }
            return true;
        }
        false
    }

    fn leader_view(&self) -> LeaderView {
        let inner = self.inner();
        let lane = inner.vm_index_of(&self.identity);
        LeaderView {
            height: inner.height,
            minute: inner.minute,
            vm_index: lane.unwrap_or(0),
            run_leader: inner.leader && lane.is_some(),
            db_finished: inner.db_finished,
        }
    }

    fn identity(&self) -> ChainId {
        self.identity
    }

    fn sign(&self, bytes: &[u8]) -> Signature {
        sign_message(bytes, &self.keypair.private)
    }

    fn snapshot(&self) -> Option<StateSnapshot> {
        let inner = self.inner();
        Some(StateSnapshot {
            height: inner.height,
            minute: inner.minute,
            vm_index: inner.vm_index_of(&self.identity).unwrap_or(0),
            entry_height_complete: inner.entry_height_complete,
            saved_at: Timestamp::now(),
        })
    }
}
