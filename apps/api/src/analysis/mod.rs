// Analysis: prompt templates, hydration, session state and the submission state machine.

pub mod cooldown;
pub mod handlers;
pub mod hydrator;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod session;
pub mod verification;

#[cfg(test)]
pub mod testing;
