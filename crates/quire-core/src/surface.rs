//! The editing surface consumed by the manager.
//!
//! `quire-core` does not define a document model. The editing engine (node trees, positions,
//! transactions) lives behind this trait and is handed to the manager at
//! [`Manager::add_view`](crate::Manager::add_view) time as an opaque capability.

/// A live editing surface: current state, transaction construction and dispatch.
pub trait Surface: 'static {
    /// Snapshot of the current document and selection.
    type State;
    /// A pending change built against [`Surface::State`].
    type Transaction;
    /// An editing-engine plugin contributed by an extension.
    type Plugin;

    /// Current state.
    fn state(&self) -> &Self::State;

    /// Start a new transaction against the current state (`state.tr`).
    fn transaction(&self) -> Self::Transaction;

    /// Apply a transaction, producing the next state.
    fn dispatch(&mut self, tr: Self::Transaction);

    /// Replace the plugin list the engine runs with.
    ///
    /// Called when the view is attached and whenever the manager rebuilds its plugin list.
    fn update_plugins(&mut self, _plugins: &[Self::Plugin]) {}
}
