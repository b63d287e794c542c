/*
 * restarter-controller - core logic for the configmap restart controller:
 * decide which ConfigMap changes matter (filter), find and restart the
 * Deployments that mount a changed ConfigMap (restart), and drive one
 * reconciliation from key to outcome (reconciler).
 *
 * Everything that touches the cluster goes through the ClusterClient
 * seam, so the whole core runs against an in-memory cluster in tests.
 */

pub mod client;
pub use client::ClusterClient;
pub use client::KubeClusterClient;

pub mod errors;
pub use errors::Error;

pub mod filter;
pub use filter::ObservedChange;

pub mod reconciler;
pub use reconciler::Outcome;
pub use reconciler::ReconciliationKey;
pub use reconciler::Reconciler;

pub mod restart;
