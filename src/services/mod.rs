pub mod assistant;
pub mod labels;
