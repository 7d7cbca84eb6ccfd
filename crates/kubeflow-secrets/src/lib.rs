//! Kubeflow Secrets Gateway
//!
//! Lets a Kubeflow user manage Kubernetes Secrets in the profile namespace
//! they own, and nowhere else. The caller's identity comes from headers set
//! by a trusted authenticating proxy; it is matched against Profile owners
//! to find their namespaces, and every Secret operation is then performed
//! by impersonating the caller.
//!
//! # Architecture
//!
//! ```text
//! proxy ──► identity ──► profile match ──► impersonated client ──► K8s API
//!           (headers)    (namespaces)      (caller's RBAC)
//! ```
//!
//! Only secrets labelled `managed-by=kubeflow-secrets` are visible; anything
//! else in the namespace reads as not found.
//!
//! # Endpoints
//!
//! - `GET /api/namespaces` - Namespaces owned by the caller
//! - `GET /api/secrets` - List managed secrets
//! - `POST /api/secrets` - Create a secret
//! - `GET|PUT|DELETE /api/secrets/{name}` - Read, replace or delete one secret
//! - `GET /api/secrets/{name}/events` - Events about a secret
//! - `GET /api/secrets/{name}/yaml` - Secret rendered as YAML
//! - `GET /healthz` - Health check

#![deny(missing_docs)]

pub mod audit;
pub mod backend;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod impersonation;
pub mod managed;
pub mod matcher;
pub mod models;
pub mod resolver;
pub mod scope;
pub mod secret;
pub mod server;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
