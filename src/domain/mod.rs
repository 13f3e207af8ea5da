// Domain layer - view models and pure dashboard logic
pub mod choropleth;
pub mod filters;
pub mod import;
pub mod scenario;
pub mod series;
pub mod territory;
