//! Subgraphs built on `@inject`, used by the `inject` binary and the integration tests.

pub mod shipping;
