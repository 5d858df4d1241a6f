//! Explicit runtime environment for grid collectives.
//!
//! Engines of this kind tend to reach for singletons (a process-group object,
//! a command-line flags object). Here everything a collective needs is passed
//! in one explicit bundle: the communicator, a verbosity flag, and the tag
//! block the grid's protocols run on.

use crate::comm::{Communicator, GridCommTags, NoComm};

/// Communicator plus configuration, passed to constructors and collectives.
#[derive(Clone, Debug)]
pub struct Environment<C: Communicator> {
    comm: C,
    verbose: bool,
    tags: GridCommTags,
}

impl Environment<NoComm> {
    /// A single-rank environment with no communication backend.
    pub fn serial() -> Self {
        Self::new(NoComm, false)
    }
}

impl<C: Communicator> Environment<C> {
    pub fn new(comm: C, verbose: bool) -> Self {
        Self {
            comm,
            verbose,
            tags: GridCommTags::default(),
        }
    }

    /// Rebase the protocol tags, for running several grids (or several tests)
    /// over one communicator without cross-talk.
    pub fn with_tags(mut self, tags: GridCommTags) -> Self {
        self.tags = tags;
        self
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn tags(&self) -> &GridCommTags {
        &self.tags
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn is_master(&self) -> bool {
        self.comm.is_master()
    }

    pub fn is_top_most(&self) -> bool {
        self.comm.is_top_most()
    }
}
