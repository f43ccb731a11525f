//! Managed inference endpoint lifecycle for LoRA model bundles.
//!
//! [`Driver`] turns a packed [`bundle::BundleArchive`] into a running endpoint
//! and back: publish, register, provision, wait, invoke, tear down. Every
//! call to the cloud goes through the [`ManagedService`] trait, implemented by
//! [`SageMaker`] (feature `aws`) and by [`InMemoryService`] for tests.

pub use {
    context::Context,
    driver::{Driver, PollPolicy},
    error::{Error, Result, Stage},
    memory::{InMemoryService, Operation},
    payload::{InvocationRequest, Parameters, generated_text},
    service::{
        Deletion, EndpointConfigSpec, EndpointHandle, EndpointStatus, HardwareSpec,
        ManagedService, ModelHandle, ModelSpec, StorageLocation, VARIANT_NAME,
    },
};

#[cfg(feature = "aws")]
pub use aws::SageMaker;

#[cfg(feature = "aws")]
mod aws;
mod context;
mod driver;
mod error;
mod memory;
mod payload;
mod service;
