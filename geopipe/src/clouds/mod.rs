//! Cloud-specific client code.

pub mod gcloud;
