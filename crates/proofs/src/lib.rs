//! Witness-proof validation
//!
//! Decides whether the witness corroborations attached to a location report
//! are acceptable: proximity within the detection range, matching epoch, a
//! successful exchange outcome, no self-witnessing, no repeated witnesses,
//! and a valid witness signature over the proof body.

pub mod validator;

pub use validator::{ProofRejection, ProofValidator, ValidationError};
