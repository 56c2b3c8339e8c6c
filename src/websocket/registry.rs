//! 连接注册表
//!
//! 由服务器状态持有，握手成功时注册，连接关闭时注销。

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

use super::connection::ConnectionState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("connection limit reached ({0})")]
    Full(usize),
    #[error("connection already registered: {0}")]
    Duplicate(String),
}

/// WebSocket 统计信息
#[derive(Debug, Default)]
pub struct WsStats {
    total_connections: AtomicU64,
    rejected_handshakes: AtomicU64,
    messages_received: AtomicU64,
    errors: AtomicU64,
}

/// 统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WsStatsSnapshot {
    pub active_connections: usize,
    pub active_streams: usize,
    pub total_connections: u64,
    pub rejected_handshakes: u64,
    pub messages_received: u64,
    pub errors: u64,
}

impl WsStats {
    pub fn on_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_rejected(&self) {
        self.rejected_handshakes.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<ConnectionState>>,
    /// 已占用的连接槽位，先预留后插入，保证并发注册不会超过上限
    active: AtomicUsize,
    max_connections: usize,
    stats: WsStats,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl ConnectionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            active: AtomicUsize::new(0),
            max_connections,
            stats: WsStats::default(),
        }
    }

    pub fn register(&self, conn: Arc<ConnectionState>) -> Result<(), RegistryError> {
        self.reserve_slot()?;
        match self.connections.entry(conn.conn_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                self.active.fetch_sub(1, Ordering::AcqRel);
                Err(RegistryError::Duplicate(conn.conn_id.clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(conn);
                self.stats.total_connections.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    fn reserve_slot(&self) -> Result<(), RegistryError> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.max_connections {
                return Err(RegistryError::Full(self.max_connections));
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn unregister(&self, conn_id: &str) -> Option<Arc<ConnectionState>> {
        let removed = self.connections.remove(conn_id).map(|(_, conn)| conn);
        if removed.is_some() {
            self.active.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn stats(&self) -> &WsStats {
        &self.stats
    }

    pub fn snapshot(&self) -> WsStatsSnapshot {
        WsStatsSnapshot {
            active_connections: self.count(),
            active_streams: self
                .connections
                .iter()
                .filter(|entry| entry.value().has_active_stream())
                .count(),
            total_connections: self.stats.total_connections.load(Ordering::Relaxed),
            rejected_handshakes: self.stats.rejected_handshakes.load(Ordering::Relaxed),
            messages_received: self.stats.messages_received.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }
}
