//! Transport-facing abstractions: the outbound port and the inbound event model.

pub mod port;
pub mod types;
