//! Vendor-specific REST clients.

/// Warehouse-hosted agent, analyst and SQL endpoints.
pub mod snowflake;
