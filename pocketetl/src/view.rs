//! # Stage View Type Bound
//!
//! Every stage's declared view type needs the same handful of
//! capabilities: project in/out of an [`Envelope`](pocketetl_domain::Envelope),
//! cross a thread boundary to run on a worker, and be cheaply
//! reconstructible so the error sink can still render a record after
//! it's been handed to the user's loader or transformer by value. One
//! trait alias keeps that bound from being repeated at every stage
//! boundary.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Blanket-implemented for any type usable as a stage's view type.
pub trait ViewType: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {}

impl<T> ViewType for T where T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static {}
