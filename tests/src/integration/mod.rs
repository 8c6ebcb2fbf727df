//! Integration flows across the workspace crates.

mod bus_flows;
mod easybackend_http;
mod email_flows;
mod runtime_flows;
