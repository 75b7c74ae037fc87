//! Client session for a prompt expansion and image generation studio.
//!
//! The [`controller::SessionController`] owns all session state: reference
//! image slots, the prompt form, the assist and generate operations, and the
//! single notification line. It talks to the studio over a
//! [`transport::SessionTransport`].

pub mod commands;
pub mod config;
pub mod controller;
pub mod error_taxonomy;
pub mod events;
pub mod form;
pub mod logging;
pub mod messages;
pub mod models;
pub mod notify;
pub mod operation;
pub mod preview;
pub mod slots;
pub mod transport;

#[cfg(test)]
mod test_support;
