#![no_std]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
pub(crate) mod utils;

pub use thread15d4_frame as frame;

pub mod config;
pub mod crypto;
pub mod dataset;
pub mod error;
pub mod instance;
pub mod key_manager;
pub mod mac;
pub mod message;
pub mod mle;
pub mod net;
pub mod network_data;
pub mod radio;
pub mod settings;
pub mod tasklet;
pub mod time;
pub mod timer;
pub mod tmf;
pub mod topology;

pub use error::{Error, Result};
pub use instance::{ChangedFlags, Instance};
