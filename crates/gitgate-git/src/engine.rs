//! The object-store engine seam between HTTP handling and git internals.

use crate::{protocol, Result, Service};
use gitgate_storage::Repository;
use std::io::{Read, Write};

/// Runs the git side of a smart HTTP exchange against one repository.
///
/// Calls are blocking and stream-oriented: `input` is the decoded request
/// body and `output` receives the framed response as it is produced. The
/// repository handle is only borrowed for the duration of a call.
pub trait ObjectEngine: Send + Sync {
    /// Writes the ref advertisement for `service`, ending with a flush packet.
    fn advertise(&self, repo: &Repository, service: Service, output: &mut dyn Write)
        -> Result<()>;

    /// Serves a fetch: reads want/have lines, writes acknowledgements and the pack.
    fn upload(&self, repo: &Repository, input: &mut dyn Read, output: &mut dyn Write)
        -> Result<()>;

    /// Serves a push: reads ref commands and a pack, writes the status report.
    fn receive(&self, repo: &Repository, input: &mut dyn Read, output: &mut dyn Write)
        -> Result<()>;

    /// Dispatches to [`upload`](Self::upload) or [`receive`](Self::receive).
    fn serve(
        &self,
        service: Service,
        repo: &Repository,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<()> {
        match service {
            Service::UploadPack => self.upload(repo, input, output),
            Service::ReceivePack => self.receive(repo, input, output),
        }
    }
}

/// Engine over the repository's loose object store.
///
/// Packs are built without deltas. Objects already stored in packfiles on
/// disk are not read.
#[derive(Debug, Clone)]
pub struct LooseObjectEngine {
    agent: String,
}

impl LooseObjectEngine {
    /// Creates an engine advertising `gitgate/<version>` as its agent.
    pub fn new(version: &str) -> Self {
        Self {
            agent: format!("gitgate/{}", version),
        }
    }

    /// The agent string sent in capability lists.
    pub fn agent(&self) -> &str {
        &self.agent
    }
}

impl ObjectEngine for LooseObjectEngine {
    fn advertise(
        &self,
        repo: &Repository,
        service: Service,
        output: &mut dyn Write,
    ) -> Result<()> {
        protocol::advertise_refs(output, repo, service, &self.agent)
    }

    fn upload(&self, repo: &Repository, input: &mut dyn Read, output: &mut dyn Write) -> Result<()> {
        protocol::upload_pack(input, output, repo)
    }

    fn receive(
        &self,
        repo: &Repository,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<()> {
        let statuses = protocol::receive_pack(input, output, repo)?;
        let rejected = statuses.iter().filter(|s| s.result.is_err()).count();
        tracing::info!(
            repo = %repo.name,
            updated = statuses.len() - rejected,
            rejected,
            "Push processed"
        );
        Ok(())
    }
}
