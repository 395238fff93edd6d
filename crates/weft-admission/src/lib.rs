//! Weft Admission - The gate in front of the executor.
//!
//! For each execution request: look the tenant up, reject if not active,
//! check the daily then monthly workflow quota, and on pass increment the
//! workflow counters. Rejections surface as typed errors before any
//! execution row exists. The controller also meters step completions on the
//! executor's behalf.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod controller;
mod directory;

pub use controller::AdmissionController;
pub use directory::{InMemoryTenants, TenantDirectory};
