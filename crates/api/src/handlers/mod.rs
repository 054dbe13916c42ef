pub mod instances;
pub mod maintenance;
pub mod root;
pub mod tasks;
