//! Flow routing and flow length over the extracted DEM.
pub mod flow_length;
pub mod flow_routing;

pub use flow_length::upstream_flow_length;
pub use flow_routing::{compute_d8_flow, FlowField};
