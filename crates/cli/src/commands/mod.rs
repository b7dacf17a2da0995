pub mod status;
pub mod suggestions;
