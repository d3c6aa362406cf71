pub mod errors;
pub mod insights;
