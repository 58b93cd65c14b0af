//! Presentation state for the overlay: the session store, the reconciler
//! that folds agent events into it, and the window layout derived from it.

pub mod layout;
pub mod reconciler;
pub mod store;

pub use layout::{derive_window_size, LayoutMetrics};
pub use reconciler::{Effect, Reconciled, Reconciler};
pub use store::{LlmCalls, SessionSnapshot, SessionStore, StoreReader};
