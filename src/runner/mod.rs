pub mod data;
pub mod executor;
pub mod parser;
pub mod variables;

pub use data::{load_users, User};
pub use executor::{RequestExecutor, StepOutcome};
pub use variables::VariableContext;
