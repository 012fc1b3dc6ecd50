//! The component status machine.

/// The ordered lifecycle states a [`crate::component::Component`] moves through.
///
/// Transitions must follow the declared order, except that `Updated` may
/// repeat and `Connecting`/`ConnectingIdle` may alternate any number of
/// times during the connect phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentStatus {
    Created,
    Initialized,
    Connecting,
    ConnectingIdle,
    Connected,
    Validated,
    Updated,
    Finished,
    Finalized,
}

impl std::fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl ComponentStatus {
    /// True once the component has exited the connect phase for good.
    pub fn is_connected_or_later(&self) -> bool {
        !matches!(
            self,
            ComponentStatus::Created
                | ComponentStatus::Initialized
                | ComponentStatus::Connecting
                | ComponentStatus::ConnectingIdle
        )
    }
}
