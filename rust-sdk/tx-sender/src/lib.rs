//! Transaction preparation, compute tuning, signing and submission for Solana.
//!
//! [`TransactionHelper`] turns instructions into a [`PreparedTransaction`], tunes
//! its compute unit limit through simulation, signs it with every attached signer
//! and submits it either through RPC or through a sign-and-send wallet.
//! [`SolTransferHelper`] and [`SplTokenHelper`] build transfers on top of it, and
//! [`InstructionPoolController`] drives the same pipeline from an observable
//! instruction pool.

mod abort;
mod compute_budget;
mod compute_config;
mod config;
mod error;
mod helper;
mod message;
mod pool;
mod prepare;
mod send;
mod signer;
mod transfer;

#[cfg(test)]
mod tests;

pub use compute_budget::*;
pub use compute_config::*;
pub use config::*;
pub use error::*;
pub use helper::*;
pub use message::*;
pub use pool::*;
pub use prepare::*;
pub use send::*;
pub use signer::*;
pub use transfer::*;
