// Application layer - Use cases and the upstream port
pub mod chart_service;
pub mod choropleth_service;
pub mod energy_api;
pub mod geo_pipeline;
pub mod request_sequence;
pub mod scenario_service;
pub mod session;
