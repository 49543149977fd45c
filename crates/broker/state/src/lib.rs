//! Stratus State - instance and binding persistence
//!
//! Two layers:
//!
//! - [`RecordStore`]: raw records whose sensitive fields are already sealed.
//!   Backends implement this; [`InMemoryRecordStore`] ships for development.
//! - [`InstanceStore`]: the plaintext API used by pipelines and the control
//!   plane. [`SealedStore`] implements it over any `RecordStore` plus a codec.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod memory;
pub mod record;
pub mod sealed;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::InMemoryRecordStore;
pub use record::{BindingRecord, InstanceRecord};
pub use sealed::SealedStore;
pub use traits::{InstanceStore, RecordStore};
