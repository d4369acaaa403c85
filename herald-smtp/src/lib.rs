//! SMTP submission client used by herald to hand messages to a relay.

pub mod client;
