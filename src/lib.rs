//! trendpilot: momentum and trend signal evaluation with position
//! lifecycle management.
//!
//! Hexagonal architecture: the decision core in [`domain`], collaborator
//! traits in [`ports`], concrete implementations in [`adapters`], and the
//! bar-feeding drivers in [`runner`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod ports;
pub mod runner;
