//! Card and APM payment sessions against the Nuvei gateway
//!
//! Deposits (card, saved option, temp token, APM) and withdrawals to a saved
//! option, each driven as a session over a [`traits::GatewayClient`].

pub mod amount;
pub mod challenge;
pub mod deposit;
pub mod merge;
pub mod method;
pub mod notification;
pub mod providers;
pub mod session;
pub mod status;
pub mod three_d;
pub mod traits;
pub mod types;
pub mod withdrawal;

pub use amount::PaymentAmount;
pub use deposit::{DepositOptions, DepositSession, ResumeIds};
pub use session::Session;
pub use status::Status;
pub use traits::GatewayClient;
pub use withdrawal::WithdrawalSession;
