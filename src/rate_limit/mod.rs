//! In-memory, per-instance request admission.
//!
//! Limits are enforced per client identity and per [`SensitivityClass`];
//! state is not shared between gateway instances.

pub mod bucket;
pub mod registry;

pub use bucket::{BucketLimit, TokenBucket};
pub use registry::{Admission, BucketRegistry, ClientKey, SensitivityClass, SharedBucket};
