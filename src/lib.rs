// Library exports for geo-assistant
// This allows the modules to be imported in tests and external code

pub mod config;
pub mod error;
pub mod llm;
pub mod matching;
pub mod planning;
pub mod session;
pub mod tools;
