//! Concrete [`GpuBackend`](crate::gpu::GpuBackend) implementations.

pub mod nvidia;
