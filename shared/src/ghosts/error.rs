use thiserror::Error;

/// Errors that can occur when driving ghosting on a connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GhostError {
    /// Ghosting operation on a connection that does not ghost from this side
    #[error("Connection does not send ghosts (set_ghost_from was never called)")]
    NotGhostingFrom,

    /// Ghosting was activated while ghosts from an earlier session remain
    #[error("Cannot activate ghosting: {count} ghosts from a previous session are still allocated")]
    GhostsStillActive { count: usize },

    /// Every ghost slot of the connection is taken
    #[error("Ghost table is full ({capacity} ghosts)")]
    TableFull { capacity: usize },
}
