//! Watch, cache and dispatch machinery for autoscaler objects.
//!
//! A [`reflector::Reflector`] lists and watches a [`reflector::ListerWatcher`],
//! feeding a [`delta::DeltaQueue`]; an [`informer::Informer`] drains that queue
//! into a [`cache::LocalCache`] and hands every change to a handler.
//! [`store::AutoscalerStore`] is the authoritative store contract; the in-memory
//! implementation replays its [`watch::EventLog`] to watchers.

pub mod cache;
pub mod delta;
pub mod informer;
pub mod reflector;
pub mod store;
pub mod watch;
