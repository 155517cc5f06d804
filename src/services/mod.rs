pub mod registration;

pub use registration::{RegistrationEngine, StudentIdentity};
