use trolley_core::{ListRecord, OwnerId};

/// The authenticated party behind a request. Authentication itself happens upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caller {
    pub owner_id: OwnerId,
}

impl Caller {
    pub fn new(owner_id: OwnerId) -> Self {
        Self { owner_id }
    }
}

/// Decides whether a caller may touch a list. Consulted before every read and mutation.
pub trait AccessPolicy: Send + Sync {
    fn can_mutate(&self, caller: &Caller, list: &ListRecord) -> bool;

    fn can_read(&self, caller: &Caller, list: &ListRecord) -> bool {
        self.can_mutate(caller, list)
    }
}

/// Only the list's owner may read or change it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerOnly;

impl AccessPolicy for OwnerOnly {
    fn can_mutate(&self, caller: &Caller, list: &ListRecord) -> bool {
        caller.owner_id == list.owner_id
    }
}
