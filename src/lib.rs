//! `egg`: scaffolds and drives the build/generate/deploy lifecycle of a
//! polyglot microservice project (Go backends behind a shared protobuf API,
//! a web-framework frontend, Docker Compose and Helm as deploy targets).

pub mod builder;
pub mod cli;
pub mod compose;
pub mod core;
pub mod dispatch;
pub mod doctor;
pub mod generator;
pub mod helm;
pub mod templates;
