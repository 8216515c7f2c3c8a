//! Core of the adaptive reading-comprehension tutor.
//!
//! The session controller is a synchronous state machine; it decides which
//! tutor request to issue and the [`driver`] runs those requests against the
//! tutor service, alongside learner input and the session countdown.

pub mod assessment;
pub mod attempt;
pub mod chat;
pub mod driver;
pub mod history;
pub mod llm_client;
pub mod log_sink;
pub mod policy;
pub mod prompt;
pub mod question;
pub mod session;
pub mod tutor_client;
