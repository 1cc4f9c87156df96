//! Registration state machine.
//!
//! `Resolving` until the address is known and every row is committed, then
//! `Registered` for the rest of the process lifetime.

use std::future::Future;
use std::net::IpAddr;

use chrono::Utc;
use tracing::{info, warn};

use crate::address::{ensure_routable, AddressResolver};
use crate::directory::{Directory, DirectoryEntry};
use crate::error::RegistrarError;

/// Registrar lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrarState {
    Resolving,
    Registered { endpoint: IpAddr },
}

/// What a successful registration wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub endpoint: IpAddr,
    pub entries: Vec<DirectoryEntry>,
}

pub struct Registrar<R, D> {
    resolver: R,
    directory: D,
    task_names: Vec<String>,
    state: RegistrarState,
}

impl<R: AddressResolver, D: Directory> Registrar<R, D> {
    pub fn new(resolver: R, directory: D, task_names: Vec<String>) -> Result<Self, RegistrarError> {
        if task_names.is_empty() {
            return Err(RegistrarError::NoTaskNames);
        }

        Ok(Self {
            resolver,
            directory,
            task_names,
            state: RegistrarState::Resolving,
        })
    }

    pub fn state(&self) -> RegistrarState {
        self.state
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Resolve the own address and publish it for every task name.
    ///
    /// Nothing is written if the address is unroutable. A store failure
    /// leaves the state at `Resolving`.
    pub async fn register(&mut self) -> Result<Registration, RegistrarError> {
        let endpoint = ensure_routable(self.resolver.resolve().await?)?;
        info!(%endpoint, "resolved own address");

        let entries = self.entries(endpoint);
        self.directory.upsert(&entries, Utc::now()).await?;

        self.state = RegistrarState::Registered { endpoint };
        info!(
            %endpoint,
            tasks = ?entries.iter().map(|e| e.task_name.as_str()).collect::<Vec<_>>(),
            "registered"
        );

        Ok(Registration { endpoint, entries })
    }

    /// One entry per distinct normalized task name, in argument order.
    fn entries(&self, endpoint: IpAddr) -> Vec<DirectoryEntry> {
        let endpoint = endpoint.to_string();
        let mut entries: Vec<DirectoryEntry> = Vec::with_capacity(self.task_names.len());
        for name in &self.task_names {
            let entry = DirectoryEntry::new(endpoint.clone(), name);
            if entries.iter().any(|e| e.task_name == entry.task_name) {
                warn!(task = %name, normalized = %entry.task_name, "duplicate task name skipped");
                continue;
            }
            entries.push(entry);
        }
        entries
    }
}

/// Stay up until `shutdown` resolves.
pub async fn idle_until<F>(shutdown: F) -> Result<(), RegistrarError>
where
    F: Future<Output = Result<(), RegistrarError>>,
{
    info!("idling until terminated");
    shutdown.await?;
    info!("termination signal received");
    Ok(())
}

/// Resolves on SIGTERM or SIGINT.
pub async fn termination_signal() -> Result<(), RegistrarError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = term.recv() => {}
        _ = int.recv() => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::StaticResolver;
    use crate::directory::MemoryDirectory;

    fn registrar(ip: &str, names: &[&str]) -> Registrar<StaticResolver, MemoryDirectory> {
        Registrar::new(
            StaticResolver(ip.parse().unwrap()),
            MemoryDirectory::new(),
            names.iter().map(|n| n.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_task_names() {
        let err = Registrar::new(
            StaticResolver("10.0.0.1".parse().unwrap()),
            MemoryDirectory::new(),
            Vec::new(),
        )
        .err()
        .unwrap();
        assert_eq!(err.reason_code(), "no_task_names");
    }

    #[test]
    fn test_entries_deduplicate_normalized_names() {
        let r = registrar("10.0.0.1", &["irc-relay", "irc_relay", "core"]);
        let entries = r.entries("10.0.0.1".parse().unwrap());
        let names: Vec<_> = entries.iter().map(|e| e.task_name.as_str()).collect();
        assert_eq!(names, vec!["irc_relay", "core"]);
    }

    #[tokio::test]
    async fn test_state_advances_on_success() {
        let mut r = registrar("10.0.0.1", &["core"]);
        assert_eq!(r.state(), RegistrarState::Resolving);

        r.register().await.unwrap();
        assert_eq!(
            r.state(),
            RegistrarState::Registered {
                endpoint: "10.0.0.1".parse().unwrap()
            }
        );
    }

    #[tokio::test]
    async fn test_idle_returns_on_shutdown() {
        idle_until(async { Ok(()) }).await.unwrap();
    }
}
