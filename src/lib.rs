//! Backend for the CompAIler component generator: model-response code
//! extraction, broken-image remediation for generated markup, and the HTTP
//! surface the browser UI talks to.

pub mod config;
pub mod extract;
pub mod generate;
pub mod models;
pub mod preview;
pub mod prompts;
pub mod remediate;
pub mod routes;
pub mod runtime;
