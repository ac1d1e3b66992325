#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![deny(
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_qualifications
)]

mod client;
mod error;
pub mod io;
pub mod model;
mod utils;

pub use client::{Client, Connection, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{Error, Result};
