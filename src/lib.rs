//! ALSA front end and command-line plumbing for the `fxlms` canceller.

pub mod alsa_io;
pub mod cli;
pub mod shutdown;
